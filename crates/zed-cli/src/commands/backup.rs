//! Backup commands: create, restore, and inspect containers.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;
use zed_backup::{
    run_export, run_import, ChainRewriter, ConflictPolicy, ContainerReader, ContainerWriter,
    ExportOptions, ImportOptions, LegacyRewriter, PrefixFilter, PrefixReplacer, Redactor,
    RewriteOutcome, Rewriter, SchemaPolicy,
};
use zed_core::{tuple, ZedError, ZedResult};

use crate::client::connect;
use crate::flags::GlobalArgs;
use crate::theme::Theme;

#[derive(Subcommand)]
pub(crate) enum BackupCommands {
    /// Export the schema and every relationship into a container file
    Create(CreateArgs),

    /// Restore a container into the connected store
    Restore(RestoreArgs),

    /// Print the schema stored in a container
    ParseSchema(ParseArgs),

    /// Print the change token a container was taken at
    ParseRevision {
        /// Backup file to inspect
        file: PathBuf,
    },

    /// Print every relationship in a container in canonical form
    ParseRelationships(ParseArgs),

    /// Copy a container with identifiers anonymized; writes the mapping
    /// sidecar next to the output
    Redact {
        /// Source backup file
        input: PathBuf,
        /// Redacted backup file to write
        output: PathBuf,
    },
}

/// Rewriter flags shared by create, restore, and the parse commands.
#[derive(Args, Clone)]
pub(crate) struct RewriterArgs {
    /// Keep only schema and relationships under this namespace prefix
    #[arg(long)]
    prefix_filter: Option<String>,

    /// Rewrite namespace prefixes, as old=new (repeatable; empty new
    /// strips the prefix)
    #[arg(long = "prefix-replacements", value_delimiter = ',')]
    prefix_replacements: Vec<String>,

    /// Scrub legacy schema productions
    #[arg(long)]
    rewrite_legacy: bool,
}

impl RewriterArgs {
    fn build(&self) -> ZedResult<Box<dyn Rewriter>> {
        let mut chain = ChainRewriter::new();
        if let Some(prefix) = &self.prefix_filter {
            if prefix.is_empty() {
                return Err(ZedError::Validation(
                    "--prefix-filter may not be empty".to_owned(),
                ));
            }
            chain = chain.with(Box::new(PrefixFilter::new(prefix.clone())));
        }
        if !self.prefix_replacements.is_empty() {
            let mut pairs = Vec::with_capacity(self.prefix_replacements.len());
            for raw in &self.prefix_replacements {
                let (old, new) = raw.split_once('=').ok_or_else(|| {
                    ZedError::Validation(format!(
                        "--prefix-replacements entries are old=new, got \"{raw}\""
                    ))
                })?;
                if old.is_empty() {
                    return Err(ZedError::Validation(
                        "the old prefix in --prefix-replacements may not be empty".to_owned(),
                    ));
                }
                pairs.push((old.to_owned(), new.to_owned()));
            }
            chain = chain.with(Box::new(PrefixReplacer::new(pairs)));
        }
        if self.rewrite_legacy {
            chain = chain.with(Box::new(LegacyRewriter));
        }
        Ok(Box::new(chain))
    }
}

#[derive(Args)]
pub(crate) struct CreateArgs {
    /// Backup file to write
    file: PathBuf,

    /// Relationships per export page
    #[arg(long, default_value_t = 1_000)]
    page_size: u32,

    #[command(flatten)]
    rewriters: RewriterArgs,
}

#[derive(Args)]
pub(crate) struct RestoreArgs {
    /// Backup file to restore
    file: PathBuf,

    /// Relationships per bulk-import batch
    #[arg(long, default_value_t = 1_000)]
    batch_size: usize,

    /// Concurrent in-flight batches
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// What to do when a relationship already exists: fail, touch, skip
    #[arg(long, default_value = "fail")]
    conflict_policy: ConflictPolicy,

    /// What to do when the target already has a schema: reject,
    /// overwrite, skip-if-exists
    #[arg(long, default_value = "reject")]
    schema_policy: SchemaPolicy,

    #[command(flatten)]
    rewriters: RewriterArgs,
}

#[derive(Args)]
pub(crate) struct ParseArgs {
    /// Backup file to inspect
    file: PathBuf,

    #[command(flatten)]
    rewriters: RewriterArgs,
}

pub(crate) async fn run(
    command: BackupCommands,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    match command {
        BackupCommands::Create(args) => create(args, globals, cancel).await,
        BackupCommands::Restore(args) => restore(args, globals, cancel).await,
        BackupCommands::ParseSchema(args) => parse_schema(&args),
        BackupCommands::ParseRevision { file } => parse_revision(&file),
        BackupCommands::ParseRelationships(args) => parse_relationships(&args),
        BackupCommands::Redact { input, output } => redact(&input, &output),
    }
}

async fn create(
    args: CreateArgs,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let backend = connect(globals, &cancel).await?;
    let summary = run_export(
        backend,
        args.rewriters.build()?,
        ExportOptions {
            output: args.file.clone(),
            page_size: args.page_size,
            max_retries: globals.max_retries,
            ..ExportOptions::default()
        },
        cancel,
    )
    .await?;
    println!(
        "{}",
        Theme::success(&format!(
            "backed up {} relationships to {} ({} filtered)",
            summary.kept,
            args.file.display(),
            summary.filtered
        ))
    );
    Ok(0)
}

async fn restore(
    args: RestoreArgs,
    globals: &GlobalArgs,
    cancel: CancellationToken,
) -> ZedResult<u8> {
    let backend = connect(globals, &cancel).await?;
    let summary = run_import(
        backend,
        args.rewriters.build()?,
        ImportOptions {
            input: args.file.clone(),
            batch_size: args.batch_size,
            concurrency: args.concurrency,
            max_retries: globals.max_retries,
            schema_policy: args.schema_policy,
            conflict_policy: args.conflict_policy,
        },
        cancel,
    )
    .await?;
    println!(
        "{}",
        Theme::success(&format!(
            "restored {} relationships ({} touched, {} skipped), watermark {}",
            summary.loaded, summary.touched, summary.skipped, summary.watermark
        ))
    );
    Ok(0)
}

fn open_container(path: &Path) -> ZedResult<ContainerReader<std::io::BufReader<std::fs::File>>> {
    let file = std::fs::File::open(path)
        .map_err(|err| ZedError::Validation(format!("cannot open {}: {err}", path.display())))?;
    ContainerReader::open(std::io::BufReader::new(file))
}

fn parse_schema(args: &ParseArgs) -> ZedResult<u8> {
    let reader = open_container(&args.file)?;
    let rewriter = args.rewriters.build()?;
    println!("{}", rewriter.rewrite_schema(reader.schema())?);
    Ok(0)
}

fn parse_revision(file: &Path) -> ZedResult<u8> {
    let reader = open_container(file)?;
    println!("{}", reader.last_revision_token());
    Ok(0)
}

fn parse_relationships(args: &ParseArgs) -> ZedResult<u8> {
    let mut reader = open_container(&args.file)?;
    let rewriter = args.rewriters.build()?;
    while let Some(rel) = reader.next_relationship()? {
        match rewriter.rewrite_relationship(rel)? {
            RewriteOutcome::Kept(rel) => println!("{}", tuple::format(&rel)),
            RewriteOutcome::Dropped => {}
        }
    }
    Ok(0)
}

fn redact(input: &Path, output: &Path) -> ZedResult<u8> {
    let mut reader = open_container(input)?;
    let redactor = Redactor::new();

    let out = std::fs::File::create(output).map_err(|err| {
        ZedError::Validation(format!("cannot create {}: {err}", output.display()))
    })?;
    let schema = redactor.rewrite_schema(reader.schema())?;
    let mut writer = ContainerWriter::create(
        std::io::BufWriter::new(out),
        &schema,
        &reader.last_revision_token(),
        false,
    )?;
    while let Some(rel) = reader.next_relationship()? {
        if let RewriteOutcome::Kept(rel) = redactor.rewrite_relationship(rel)? {
            writer.append(&rel, None)?;
        }
    }
    writer
        .close()?
        .into_inner()
        .map_err(|err| ZedError::Internal(format!("flush failed: {err}")))?
        .sync_all()
        .map_err(|err| ZedError::Internal(format!("fsync failed: {err}")))?;

    let map_path = output.with_extension("redaction.json");
    redactor.map().save(&map_path)?;
    println!(
        "{}",
        Theme::success(&format!(
            "redacted backup written to {} (mapping in {})",
            output.display(),
            map_path.display()
        ))
    );
    Ok(0)
}
