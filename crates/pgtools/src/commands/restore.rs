//! `pgtools restore|load`: replay one or more archives.

use clap::Args;

use super::{explain_cancel, Context};
use pgtools_core::{restore_archives, PgToolsError, RestoreOptions};

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Execute only role-related statements
    #[arg(short = 'u', long = "users")]
    pub users: bool,

    /// With --users, keep only statements naming a role catalog table
    /// (CREATE/ALTER/DROP ROLE lines are skipped)
    #[arg(long = "catalog-only", requires = "users")]
    pub catalog_only: bool,

    /// Archives to restore, in order
    #[arg(required = true, value_name = "ARCHIVE")]
    pub archives: Vec<String>,
}

pub async fn run(ctx: &Context, args: &RestoreArgs) -> Result<(), PgToolsError> {
    let scope = ctx.cancel_scope();
    let connector = ctx.connector(&scope)?;
    let options = RestoreOptions {
        roles_only: args.users,
        role_ddl: !args.catalog_only,
        maintenance_db: connector.config().maintenance_db().to_string(),
    };

    let summaries = explain_cancel(&scope, restore_archives(&connector, &args.archives, &options).await)?;
    for summary in &summaries {
        if args.users {
            println!(
                "Restored {}: {} statement(s) executed, {} skipped",
                summary.archive, summary.executed, summary.skipped
            );
        } else {
            println!("Restored {}: {} statement(s) executed", summary.archive, summary.executed);
        }
    }
    Ok(())
}
