//! Schema commands.

use std::path::PathBuf;

use clap::Subcommand;
use tokio_util::sync::CancellationToken;
use zed_core::{ZedError, ZedResult};

use crate::client::{connect, connect_context};
use crate::flags::GlobalArgs;
use crate::theme::Theme;

#[derive(Subcommand)]
pub(crate) enum SchemaCommands {
    /// Print the current schema
    Read {
        /// Emit JSON instead of the bare schema text
        #[arg(long)]
        json: bool,
    },

    /// Replace the schema with the contents of a file ("-" for stdin)
    Write {
        /// Schema file to upload
        file: PathBuf,
    },

    /// Copy the schema from one context to another
    Copy {
        /// Source context name
        src: String,
        /// Destination context name
        dst: String,
    },
}

pub(crate) async fn run(
    command: SchemaCommands,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    match command {
        SchemaCommands::Read { json } => read(globals, json, cancel).await,
        SchemaCommands::Write { file } => write(globals, &file, cancel).await,
        SchemaCommands::Copy { src, dst } => copy(globals, &src, &dst, cancel).await,
    }
}

async fn read(globals: &GlobalArgs, json: bool, cancel: CancellationToken) -> ZedResult<u8> {
    let backend = connect(globals, &cancel).await?;
    let response = backend.read_schema().await?;
    if json {
        let doc = serde_json::json!({
            "schemaText": response.schema_text,
            "readAt": response.read_at.map(|t| t.token),
        });
        println!("{doc:#}");
    } else {
        println!("{}", response.schema_text);
    }
    Ok(0)
}

async fn write(
    globals: &GlobalArgs,
    file: &std::path::Path,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let schema = if file.as_os_str() == "-" {
        let mut text = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut text)
            .map_err(|err| ZedError::Validation(format!("cannot read stdin: {err}")))?;
        text
    } else {
        std::fs::read_to_string(file).map_err(|err| {
            ZedError::Validation(format!("cannot read {}: {err}", file.display()))
        })?
    };
    if schema.trim().is_empty() {
        return Err(ZedError::Validation("the schema file is empty".to_owned()));
    }

    let backend = connect(globals, &cancel).await?;
    let response = backend.write_schema(schema).await?;
    let token = response.written_at.map(|t| t.token).unwrap_or_default();
    println!("{}", Theme::success(&format!("schema written at {token}")));
    Ok(0)
}

async fn copy(
    globals: &GlobalArgs,
    src: &str,
    dst: &str,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    if src == dst {
        return Err(ZedError::Validation(
            "source and destination contexts are the same".to_owned(),
        ));
    }
    let source = connect_context(src, globals, &cancel).await?;
    let schema = source.read_schema().await?.schema_text;

    let destination = connect_context(dst, globals, &cancel).await?;
    let response = destination.write_schema(schema).await?;
    let token = response.written_at.map(|t| t.token).unwrap_or_default();
    println!(
        "{}",
        Theme::success(&format!("schema copied {src} → {dst} at {token}"))
    );
    Ok(0)
}
