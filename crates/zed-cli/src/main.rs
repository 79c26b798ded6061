//! zed, the operator CLI for the permissions service.
//!
//! The binary is a thin dispatcher: parse argv, resolve the current context
//! into a connection token, build the transport, route to the operation,
//! format the output. Exit codes: 0 success, 1 generic, 2 validation,
//! 3 connection/TLS, 4 server, 130 interrupted.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use zed_core::{ZedError, ZedResult};

mod client;
mod commands;
mod explain;
mod flags;
mod theme;

use commands::{backup, context, permission, relationship, schema, watch};
use flags::GlobalArgs;
use theme::Theme;

/// Manage a permissions service from the terminal.
#[derive(Parser)]
#[command(name = "zed", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage named contexts (endpoints and credentials)
    Context {
        #[command(subcommand)]
        command: context::ContextCommands,
    },

    /// Read, write, or copy the schema
    Schema {
        #[command(subcommand)]
        command: schema::SchemaCommands,
    },

    /// Query permissions
    Permission {
        #[command(subcommand)]
        command: permission::PermissionCommands,
    },

    /// Create, read, and delete relationships
    Relationship {
        #[command(subcommand)]
        command: relationship::RelationshipCommands,
    },

    /// Stream relationship changes as they commit
    Watch(watch::WatchArgs),

    /// Take, inspect, and restore backups
    Backup {
        #[command(subcommand)]
        command: backup::BackupCommands,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.globals.log_level);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", Theme::warning("interrupted"));
            signal_cancel.cancel();
        }
    });

    match dispatch(cli, cancel).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            report(&err);
            exit_code(&err)
        }
    }
}

async fn dispatch(cli: Cli, cancel: CancellationToken) -> ZedResult<u8> {
    match cli.command {
        Commands::Context { command } => context::run(command, &cli.globals),
        Commands::Schema { command } => schema::run(command, &cli.globals, cancel).await,
        Commands::Permission { command } => permission::run(command, &cli.globals, cancel).await,
        Commands::Relationship { command } => {
            relationship::run(command, &cli.globals, cancel).await
        }
        Commands::Watch(args) => watch::run(args, &cli.globals, cancel).await,
        Commands::Backup { command } => backup::run(command, &cli.globals, cancel).await,
    }
}

fn report(err: &ZedError) {
    match err {
        // The SIGINT notice already went to stderr.
        ZedError::Cancelled => {}
        ZedError::Validation(message) => {
            eprintln!("{}", Theme::error(message));
            eprintln!("{}", Theme::dimmed("run with --help for usage"));
        }
        ZedError::ServerRejected {
            reason, message, ..
        } if !reason.is_empty() => {
            eprintln!("{}", Theme::error(&format!("{message} ({reason})")));
        }
        other => eprintln!("{}", Theme::error(&other.to_string())),
    }
}

fn exit_code(err: &ZedError) -> ExitCode {
    u8::try_from(err.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn the_command_tree_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tri_state_booleans_distinguish_unset_from_false() {
        let cli = Cli::try_parse_from(["zed", "schema", "read"]).unwrap();
        assert_eq!(cli.globals.insecure, None);

        let cli = Cli::try_parse_from(["zed", "--insecure", "schema", "read"]).unwrap();
        assert_eq!(cli.globals.insecure, Some(true));

        let cli = Cli::try_parse_from(["zed", "--insecure=false", "schema", "read"]).unwrap();
        assert_eq!(cli.globals.insecure, Some(false));
    }
}
