//! Context commands: the only mutators of the config and secret stores.


use clap::Subcommand;
use zed_config::StoredContext;
use zed_core::{ZedError, ZedResult};
use zed_secrets::Secret;

use crate::client::{config_store, secret_store};
use crate::flags::GlobalArgs;
use crate::theme::Theme;

#[derive(Subcommand)]
pub(crate) enum ContextCommands {
    /// List configured contexts
    List {
        /// Emit the config document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Select the context used by subsequent commands
    Use {
        /// Name of the context to select
        name: String,
    },

    /// Create or update a context
    Set {
        /// Context name
        name: String,
        /// Endpoint of the permissions service (host:port)
        endpoint: String,
        /// Bearer token; stored in the secret backend, never in config.json
        api_token: Option<String>,
    },

    /// Remove a context and its stored secret
    Remove {
        /// Name of the context to remove
        name: String,
    },
}

pub(crate) fn run(command: ContextCommands, globals: &GlobalArgs) -> ZedResult<u8> {
    match command {
        ContextCommands::List { json } => list(json),
        ContextCommands::Use { name } => use_context(&name),
        ContextCommands::Set {
            name,
            endpoint,
            api_token,
        } => set(&name, &endpoint, api_token.as_deref(), globals),
        ContextCommands::Remove { name } => remove(&name),
    }
}

fn list(json: bool) -> ZedResult<u8> {
    let store = config_store()?;
    let config = store.load()?;

    if json {
        let doc = serde_json::to_string_pretty(&config)
            .map_err(|err| ZedError::Internal(err.to_string()))?;
        println!("{doc}");
        return Ok(0);
    }

    if config.contexts.is_empty() {
        println!(
            "{}",
            Theme::dimmed("no contexts configured; create one with `zed context set`")
        );
        return Ok(0);
    }

    println!("{:<3}{:<24}{}", "", Theme::header("NAME"), Theme::header("ENDPOINT"));
    for context in &config.contexts {
        let marker = if context.name == config.current_context {
            "→ "
        } else {
            "  "
        };
        let mut tls_notes = Vec::new();
        if context.insecure == Some(true) {
            tls_notes.push("insecure");
        }
        if context.no_verify_ca == Some(true) {
            tls_notes.push("no-verify-ca");
        }
        let notes = if tls_notes.is_empty() {
            String::new()
        } else {
            Theme::dimmed(&format!("  [{}]", tls_notes.join(", ")))
        };
        println!("{marker} {:<24}{}{notes}", context.name, context.endpoint);
    }
    Ok(0)
}

fn use_context(name: &str) -> ZedResult<u8> {
    let store = config_store()?;
    let mut config = store.load()?;
    if config.context(name).is_none() {
        return Err(ZedError::Validation(format!("no context named \"{name}\"")));
    }
    config.current_context = name.to_owned();
    store.save(&config)?;
    println!("{}", Theme::success(&format!("using context \"{name}\"")));
    Ok(0)
}

fn set(
    name: &str,
    endpoint: &str,
    api_token: Option<&str>,
    globals: &GlobalArgs,
) -> ZedResult<u8> {
    if name.is_empty() {
        return Err(ZedError::Validation("context name may not be empty".to_owned()));
    }

    let store = config_store()?;
    let secrets = secret_store(&store)?;
    let mut config = store.load()?;

    let ca_cert = match &globals.certificate_path {
        Some(path) => std::fs::read(path).map_err(|err| {
            ZedError::Validation(format!(
                "cannot read certificate at {}: {err}",
                path.display()
            ))
        })?,
        None => Vec::new(),
    };

    // Secrets first: a context without its token is worse than no context.
    secrets.put(
        name,
        &Secret {
            api_token: api_token.or(globals.token.as_deref()).unwrap_or_default().to_owned(),
            ca_cert,
        },
    )?;

    config.upsert(StoredContext {
        name: name.to_owned(),
        endpoint: endpoint.to_owned(),
        insecure: globals.insecure,
        no_verify_ca: globals.no_verify_ca,
        extra: serde_json::Map::new(),
    });
    if config.current_context.is_empty() {
        config.current_context = name.to_owned();
    }
    store.save(&config)?;

    println!(
        "{}",
        Theme::success(&format!("context \"{name}\" → {endpoint}"))
    );
    Ok(0)
}

fn remove(name: &str) -> ZedResult<u8> {
    let store = config_store()?;
    let secrets = secret_store(&store)?;
    let mut config = store.load()?;
    if !config.remove(name) {
        return Err(ZedError::Validation(format!("no context named \"{name}\"")));
    }
    store.save(&config)?;
    secrets.delete(name)?;
    println!("{}", Theme::success(&format!("removed context \"{name}\"")));
    Ok(0)
}
