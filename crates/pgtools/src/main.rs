//! pgtools - PostgreSQL administration, backup and restore from the command line.

mod commands;

use clap::{Parser, Subcommand};
use std::time::Duration;

use commands::backup::BackupArgs;
use commands::db::DbCommand;
use commands::env::EnvCommand;
use commands::restore::RestoreArgs;
use commands::roles::RolesCommand;
use commands::srv::SrvCommand;
use commands::Context;
use pgtools_core::logging::init_logging_default;
use pgtools_core::services::DEFAULT_ENVIRONMENT;
use pgtools_core::PgToolsError;

#[derive(Parser, Debug)]
#[command(name = "pgtools", version)]
#[command(about = "PostgreSQL administration, backup and restore", long_about = None)]
#[command(subcommand_required = true, arg_required_else_help = true)]
pub(crate) struct Cli {
    /// Environment (target server) to use
    #[arg(short = 'e', long = "env", global = true, default_value = DEFAULT_ENVIRONMENT)]
    env: String,

    /// Log level
    #[arg(
        short = 'l',
        long = "loglevel",
        global = true,
        value_parser = ["none", "error", "warn", "info", "debug", "trace"]
    )]
    loglevel: Option<String>,

    /// Cancel the operation after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Database administration
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Dump databases or global roles into an archive
    #[command(visible_alias = "dump")]
    Backup(BackupArgs),
    /// Replay archives against the server
    #[command(visible_alias = "load")]
    Restore(RestoreArgs),
    /// Role listings
    #[command(visible_alias = "users")]
    Roles {
        #[command(subcommand)]
        command: RolesCommand,
    },
    /// Server-level operations
    #[command(visible_alias = "server")]
    Srv {
        #[command(subcommand)]
        command: SrvCommand,
    },
    /// Manage environments
    Env {
        #[command(subcommand)]
        command: EnvCommand,
    },
}

async fn run(cli: Cli) -> Result<(), PgToolsError> {
    let ctx = Context {
        env: cli.env,
        timeout: cli.timeout.filter(|secs| *secs > 0).map(Duration::from_secs),
    };
    match cli.command {
        Commands::Db { command } => commands::db::run(&ctx, command).await,
        Commands::Backup(args) => commands::backup::run(&ctx, &args).await,
        Commands::Restore(args) => commands::restore::run(&ctx, &args).await,
        Commands::Roles { command } => commands::roles::run(&ctx, command).await,
        Commands::Srv { command } => commands::srv::run(&ctx, command).await,
        Commands::Env { command } => commands::env::run(&ctx, command),
    }
}

fn report(error: &PgToolsError) {
    eprintln!("Error {}: {error}", error.code());
    if let Some(hint) = error.hint() {
        eprintln!("Hint: {hint}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let logging_guard = init_logging_default(cli.loglevel.as_deref());

    tracing::info!(env = %cli.env, "Starting pgtools");

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(code = e.code(), category = e.category(), error = %e, "Command failed");
            report(&e);
            e.code()
        }
    };

    // Flush file logs before exiting.
    drop(logging_guard);
    std::process::exit(code);
}
