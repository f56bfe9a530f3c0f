//! `pgtools roles ...`: role listings.

use clap::Subcommand;

use super::{explain_cancel, Context};
use pgtools_core::services::admin::{self, RoleInfo};
use pgtools_core::{Connector, PgConnector, PgToolsError};

#[derive(Subcommand, Debug)]
pub enum RolesCommand {
    /// List roles and their attributes
    List {
        /// Add a column with each role's direct members
        #[arg(short = 'm', long)]
        members: bool,
    },
}

pub async fn run(ctx: &Context, command: RolesCommand) -> Result<(), PgToolsError> {
    let scope = ctx.cancel_scope();
    let connector = ctx.connector(&scope)?;
    let result = execute(&connector, command).await;
    explain_cancel(&scope, result)
}

async fn execute(connector: &PgConnector, command: RolesCommand) -> Result<(), PgToolsError> {
    let session = connector.connect(connector.config().maintenance_db()).await?;
    match command {
        RolesCommand::List { members } => print_roles(&admin::list_roles(&session).await?, members),
    }
    Ok(())
}

fn print_roles(roles: &[RoleInfo], members: bool) {
    let width = roles.iter().map(|r| r.name.len()).max().unwrap_or(0).max(9);
    if members {
        println!("{:<width$}  {:<40}  Members", "Role name", "Attributes");
    } else {
        println!("{:<width$}  Attributes", "Role name");
    }
    for role in roles {
        let attributes = role.attributes().join(", ");
        if members {
            println!("{:<width$}  {:<40}  {}", role.name, attributes, role.members.join(", "));
        } else {
            println!("{:<width$}  {}", role.name, attributes);
        }
    }
}
