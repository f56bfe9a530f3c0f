//! `pgtools db ...`: single-statement administration on the maintenance database.

use clap::Subcommand;

use super::{explain_cancel, Context};
use pgtools_core::services::admin::{self, format_size, SchemaInfo, SessionInfo, TableInfo};
use pgtools_core::{Connector, PgConnector, PgToolsError};

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// List databases with their sizes
    List {
        /// Largest first instead of by name
        #[arg(long)]
        size: bool,
    },
    /// Show the server version
    Version,
    /// List user tables with row estimates and sizes
    Tables {
        /// Databases to inspect (default: the maintenance database)
        #[arg(value_name = "DATABASE")]
        databases: Vec<String>,
    },
    /// List schemas with table/view counts and sizes
    Schemas {
        /// Databases to inspect (default: the maintenance database)
        #[arg(value_name = "DATABASE")]
        databases: Vec<String>,
    },
    /// List server sessions from pg_stat_activity
    #[command(visible_alias = "activity")]
    Sessions,
    /// Create a database
    Create {
        name: String,
        /// Owning role
        #[arg(long)]
        owner: Option<String>,
    },
    /// Drop a database
    Drop {
        name: String,
        /// Terminate open sessions on the database first
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(ctx: &Context, command: DbCommand) -> Result<(), PgToolsError> {
    let scope = ctx.cancel_scope();
    let connector = ctx.connector(&scope)?;
    let result = execute(&connector, command).await;
    explain_cancel(&scope, result)
}

/// Databases a per-database listing covers.
fn listing_targets(databases: Vec<String>, maintenance_db: &str) -> Vec<String> {
    if databases.is_empty() {
        vec![maintenance_db.to_string()]
    } else {
        databases
    }
}

async fn execute(connector: &PgConnector, command: DbCommand) -> Result<(), PgToolsError> {
    match command {
        DbCommand::Tables { databases } => {
            for name in listing_targets(databases, connector.config().maintenance_db()) {
                let session = connector.connect(&name).await?;
                print_tables(&name, &admin::list_tables(&session).await?);
            }
            Ok(())
        }
        DbCommand::Schemas { databases } => {
            for name in listing_targets(databases, connector.config().maintenance_db()) {
                let session = connector.connect(&name).await?;
                print_schemas(&name, &admin::list_schemas(&session).await?);
            }
            Ok(())
        }
        other => execute_on_maintenance(connector, other).await,
    }
}

async fn execute_on_maintenance(connector: &PgConnector, command: DbCommand) -> Result<(), PgToolsError> {
    let session = connector.connect(connector.config().maintenance_db()).await?;
    match command {
        DbCommand::List { size } => {
            let databases = admin::list_databases(&session, size).await?;
            let width = databases.iter().map(|db| db.name.len()).max().unwrap_or(0).max(8);
            println!("{:<width$}  {:>10}", "Name", "Size");
            for db in &databases {
                println!("{:<width$}  {:>10}", db.name, format_size(db.size_bytes));
            }
        }
        DbCommand::Version => {
            println!("{}", admin::server_version(&session).await?);
        }
        DbCommand::Sessions => print_sessions(&admin::list_sessions(&session).await?),
        DbCommand::Tables { .. } | DbCommand::Schemas { .. } => {
            return Err(PgToolsError::internal("per-database listing routed to the maintenance database"));
        }
        DbCommand::Create { name, owner } => {
            admin::create_database(&session, &name, owner.as_deref()).await?;
            println!("Database {name} created");
        }
        DbCommand::Drop { name, force } => {
            if name == session.database() {
                return Err(PgToolsError::invalid_arguments(format!(
                    "cannot drop {name}: it is the maintenance database of this environment"
                )));
            }
            admin::drop_database(&session, &name, force).await?;
            println!("Database {name} dropped");
        }
    }
    Ok(())
}

fn print_tables(database: &str, tables: &[TableInfo]) {
    println!("Database {database}: {} table(s)", tables.len());
    let width = tables.iter().map(|t| t.schema.len() + t.name.len() + 1).max().unwrap_or(0).max(5);
    println!(
        "{:<width$}  {:<12}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  PK",
        "Table", "Owner", "Rows", "Total", "Data", "Indexes", "Toast"
    );
    for t in tables {
        println!(
            "{:<width$}  {:<12}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {}",
            format!("{}.{}", t.schema, t.name),
            t.owner,
            t.live_rows,
            t.total_size,
            t.table_size,
            t.index_size,
            t.toast_size,
            if t.has_primary_key { "yes" } else { "no" }
        );
    }
}

fn print_schemas(database: &str, schemas: &[SchemaInfo]) {
    println!("Database {database}: {} schema(s)", schemas.len());
    let width = schemas.iter().map(|s| s.name.len()).max().unwrap_or(0).max(6);
    println!("{:<width$}  {:<12}  {:>6}  {:>6}  {:>10}", "Schema", "Owner", "Tables", "Views", "Size");
    for s in schemas {
        println!("{:<width$}  {:<12}  {:>6}  {:>6}  {:>10}", s.name, s.owner, s.tables, s.views, s.size);
    }
}

fn print_sessions(sessions: &[SessionInfo]) {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    println!(
        "{:>7}  {:<12}  {:<12}  {:<16}  {:<21}  {:<8}  {:<20}  Query",
        "PID", "User", "Database", "Application", "Client", "State", "Wait"
    );
    for s in sessions {
        let client = match (&s.client_addr, s.client_port) {
            (Some(addr), Some(port)) if port >= 0 => format!("{addr}:{port}"),
            (Some(addr), _) => addr.clone(),
            (None, _) => "local".to_string(),
        };
        let wait = match (&s.wait_event_type, &s.wait_event) {
            (Some(kind), Some(event)) => format!("{kind}/{event}"),
            _ => String::new(),
        };
        println!(
            "{:>7}  {:<12}  {:<12}  {:<16}  {:<21}  {:<8}  {:<20}  {}",
            s.pid,
            text(&s.user),
            text(&s.database),
            text(&s.application),
            client,
            text(&s.state),
            wait,
            s.query.replace('\n', " ")
        );
    }
}
