//! `pgtools backup|dump`: write databases or global roles to an archive.
//!
//! The last positional argument is always the archive name; everything before
//! it is a database name.

use clap::Args;

use super::{explain_cancel, Context};
use pgtools_core::services::DumpTarget;
use pgtools_core::{write_archive, DumpRequest, PgToolsError};

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Dump every non-template database except the maintenance one
    #[arg(short = 'a', long = "all", conflicts_with = "users")]
    pub all: bool,

    /// Dump global roles and users only
    #[arg(short = 'u', long = "users")]
    pub users: bool,

    /// Rows only: no DROP/CREATE statements, no constraints
    #[arg(short = 'd', long = "data-only", conflicts_with = "users")]
    pub data_only: bool,

    /// Database names followed by the archive name
    #[arg(required = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl BackupArgs {
    /// What to dump and where, validated without touching the server.
    pub fn target(&self) -> Result<(DumpTarget, String), PgToolsError> {
        let Some((archive, names)) = self.args.split_last() else {
            return Err(PgToolsError::invalid_arguments("missing archive name"));
        };
        if archive.is_empty() {
            return Err(PgToolsError::invalid_arguments("empty archive name"));
        }

        let target = if self.users || self.all {
            if !names.is_empty() {
                return Err(PgToolsError::invalid_arguments(format!(
                    "--{} takes only the archive name, got {} extra argument(s)",
                    if self.users { "users" } else { "all" },
                    names.len()
                )));
            }
            if self.users {
                DumpTarget::Roles
            } else {
                DumpTarget::AllDatabases
            }
        } else if names.is_empty() {
            return Err(PgToolsError::invalid_arguments(
                "no database names given (use --all to dump every database)",
            ));
        } else {
            DumpTarget::Databases(names.to_vec())
        };
        Ok((target, archive.clone()))
    }
}

pub async fn run(ctx: &Context, args: &BackupArgs) -> Result<(), PgToolsError> {
    let (target, archive) = args.target()?;
    let scope = ctx.cancel_scope();
    let connector = ctx.connector(&scope)?;
    let request = DumpRequest {
        target,
        archive,
        data_only: args.data_only,
        maintenance_db: connector.config().maintenance_db().to_string(),
    };

    let summary = explain_cancel(&scope, write_archive(&connector, &request).await)?;
    if request.target == DumpTarget::Roles {
        println!("Backup of {} role(s) written to {}", summary.roles, summary.archive);
    } else {
        println!(
            "Backup of {} database(s), {} table(s), {} row(s) written to {}",
            summary.databases.len(),
            summary.tables,
            summary.rows,
            summary.archive
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{Cli, Commands};
    use clap::Parser;

    use super::*;

    fn backup(argv: &[&str]) -> BackupArgs {
        let mut full = vec!["pgtools", "backup"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Backup(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_databases_then_archive() {
        let (target, archive) = backup(&["shop", "crm", "nightly"]).target().unwrap();
        assert_eq!(target, DumpTarget::Databases(vec!["shop".into(), "crm".into()]));
        assert_eq!(archive, "nightly");
    }

    #[test]
    fn test_all_and_users() {
        let (target, _) = backup(&["-a", "everything.gz"]).target().unwrap();
        assert_eq!(target, DumpTarget::AllDatabases);

        let (target, archive) = backup(&["--users", "roles"]).target().unwrap();
        assert_eq!(target, DumpTarget::Roles);
        assert_eq!(archive, "roles");
    }

    #[test]
    fn test_invalid_combinations() {
        assert_eq!(backup(&["only-archive"]).target().err().unwrap().code(), 80);
        assert_eq!(backup(&["-u", "shop", "roles"]).target().err().unwrap().code(), 80);
        assert!(Cli::try_parse_from(["pgtools", "backup", "-a", "-u", "out"]).is_err());
        assert!(Cli::try_parse_from(["pgtools", "backup", "-u", "-d", "out"]).is_err());
        assert!(Cli::try_parse_from(["pgtools", "backup"]).is_err());
    }

    #[test]
    fn test_data_only_flag() {
        let args = backup(&["-d", "shop", "rows.sql"]);
        assert!(args.data_only);
        assert_eq!(args.target().unwrap().1, "rows.sql");
    }
}
