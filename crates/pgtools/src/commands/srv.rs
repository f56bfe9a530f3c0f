//! `pgtools srv ...`: server-level operations.

use clap::Subcommand;

use super::{explain_cancel, Context};
use pgtools_core::services::admin;
use pgtools_core::{Connector, PgConnector, PgToolsError};

#[derive(Subcommand, Debug)]
pub enum SrvCommand {
    /// Reload the server configuration (pg_reload_conf)
    Reload,
    /// Show the server version
    Version,
}

pub async fn run(ctx: &Context, command: SrvCommand) -> Result<(), PgToolsError> {
    let scope = ctx.cancel_scope();
    let connector = ctx.connector(&scope)?;
    let result = execute(&connector, command).await;
    explain_cancel(&scope, result)
}

async fn execute(connector: &PgConnector, command: SrvCommand) -> Result<(), PgToolsError> {
    let session = connector.connect(connector.config().maintenance_db()).await?;
    match command {
        SrvCommand::Reload => {
            admin::reload_config(&session).await?;
            println!("Configuration reloaded");
        }
        SrvCommand::Version => println!("{}", admin::server_version(&session).await?),
    }
    Ok(())
}
