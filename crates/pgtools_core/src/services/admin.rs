//! Single-statement server administration: read-only listings of databases,
//! tables, schemas, sessions and roles, plus database creation, removal and
//! configuration reload.

use crate::error::PgToolsError;
use crate::quote::quote_identifier;
use crate::services::catalog::user_table_filter;
use crate::services::connection::{column, PgSession};

/// A database with its on-disk size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// `pg_database_size`, in bytes.
    pub size_bytes: i64,
}

/// Render a byte count the way `pg_size_pretty` does.
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["bytes", "kB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 10240.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", value.round() as i64, UNITS[unit])
}

/// Order database listings by name (ascending) or by size (largest first).
pub fn sort_databases(databases: &mut [DatabaseInfo], by_size: bool) {
    if by_size {
        databases.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then_with(|| a.name.cmp(&b.name)));
    } else {
        databases.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// Non-template databases with their sizes.
pub async fn list_databases(
    session: &PgSession,
    sort_by_size: bool,
) -> Result<Vec<DatabaseInfo>, PgToolsError> {
    let rows = session
        .query(
            "SELECT datname::text AS name, pg_catalog.pg_database_size(datname) AS size_bytes \
             FROM pg_catalog.pg_database WHERE NOT datistemplate",
            &[],
        )
        .await
        .map_err(|e| e.into_catalog("database list"))?;
    let mut databases = rows
        .iter()
        .map(|row| Ok(DatabaseInfo { name: column(row, "name")?, size_bytes: column(row, "size_bytes")? }))
        .collect::<Result<Vec<_>, PgToolsError>>()?;
    sort_databases(&mut databases, sort_by_size);
    Ok(databases)
}

/// `SHOW server_version`.
pub async fn server_version(session: &PgSession) -> Result<String, PgToolsError> {
    let row = session
        .query_one("SHOW server_version", &[])
        .await
        .map_err(|e| e.into_catalog("server version"))?;
    row.try_get(0).map_err(|e| PgToolsError::scan(e.to_string()))
}

/// A user table of the connected database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub owner: String,
    /// Estimated live rows from the statistics collector.
    pub live_rows: i64,
    /// Sizes as rendered by `pg_size_pretty`.
    pub total_size: String,
    pub table_size: String,
    pub index_size: String,
    pub toast_size: String,
    pub has_primary_key: bool,
}

/// A non-system schema with its object counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    pub name: String,
    pub owner: String,
    pub tables: i64,
    /// Views and materialized views.
    pub views: i64,
    pub size: String,
}

/// One row of `pg_stat_activity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub pid: i32,
    pub user: Option<String>,
    pub database: Option<String>,
    pub application: Option<String>,
    pub client_addr: Option<String>,
    pub client_port: Option<i32>,
    pub backend_start: Option<String>,
    pub state: Option<String>,
    pub wait_event_type: Option<String>,
    pub wait_event: Option<String>,
    /// First 120 characters of the current or last query.
    pub query: String,
}

/// A role with its attribute flags and direct members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub name: String,
    pub login: bool,
    pub superuser: bool,
    pub create_db: bool,
    pub create_role: bool,
    pub inherit: bool,
    pub replication: bool,
    pub bypass_rls: bool,
    pub members: Vec<String>,
}

impl RoleInfo {
    /// Attribute keywords that are set, `psql \du` style.
    pub fn attributes(&self) -> Vec<&'static str> {
        [
            (self.superuser, "Superuser"),
            (self.create_role, "Create role"),
            (self.create_db, "Create DB"),
            (self.replication, "Replication"),
            (self.bypass_rls, "Bypass RLS"),
            (!self.inherit, "No inheritance"),
            (!self.login, "Cannot login"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect()
    }
}

fn tables_sql() -> String {
    format!(
        r#"
        SELECT
            n.nspname::text AS schema,
            c.relname::text AS name,
            pg_catalog.pg_get_userbyid(c.relowner)::text AS owner,
            COALESCE(s.n_live_tup, 0)::bigint AS live_rows,
            pg_catalog.pg_size_pretty(pg_catalog.pg_total_relation_size(c.oid)) AS total_size,
            pg_catalog.pg_size_pretty(pg_catalog.pg_relation_size(c.oid)) AS table_size,
            pg_catalog.pg_size_pretty(pg_catalog.pg_indexes_size(c.oid)) AS index_size,
            pg_catalog.pg_size_pretty(COALESCE(pg_catalog.pg_total_relation_size(NULLIF(c.reltoastrelid, 0)), 0)) AS toast_size,
            EXISTS (
                SELECT 1 FROM pg_catalog.pg_index i WHERE i.indrelid = c.oid AND i.indisprimary
            ) AS has_primary_key
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_stat_all_tables s ON s.relid = c.oid
        WHERE {}
        ORDER BY n.nspname, c.relname
        "#,
        user_table_filter("c", "n")
    )
}

const SCHEMAS_SQL: &str = r#"
    SELECT
        n.nspname::text AS name,
        pg_catalog.pg_get_userbyid(n.nspowner)::text AS owner,
        count(c.oid) FILTER (WHERE c.relkind = 'r') AS tables,
        count(c.oid) FILTER (WHERE c.relkind IN ('v', 'm')) AS views,
        pg_catalog.pg_size_pretty(
            COALESCE(sum(pg_catalog.pg_total_relation_size(c.oid)) FILTER (WHERE c.relkind IN ('r', 'm')), 0)
        ) AS size
    FROM pg_catalog.pg_namespace n
    LEFT JOIN pg_catalog.pg_class c ON c.relnamespace = n.oid
    WHERE n.nspname !~ '^pg_'
      AND n.nspname <> 'information_schema'
    GROUP BY n.nspname, n.nspowner
    ORDER BY n.nspname
"#;

const SESSIONS_SQL: &str = r#"
    SELECT
        pid,
        usename::text AS user_name,
        datname::text AS database,
        application_name::text AS application,
        client_addr::text AS client_addr,
        client_port,
        backend_start::text AS backend_start,
        state::text AS state,
        wait_event_type::text AS wait_event_type,
        wait_event::text AS wait_event,
        left(COALESCE(query, ''), 120) AS query
    FROM pg_catalog.pg_stat_activity
    ORDER BY backend_start
"#;

const ROLES_SQL: &str = r#"
    SELECT
        r.rolname::text AS name,
        r.rolcanlogin, r.rolsuper, r.rolcreatedb, r.rolcreaterole,
        r.rolinherit, r.rolreplication, r.rolbypassrls,
        ARRAY(
            SELECT m.rolname::text
            FROM pg_catalog.pg_auth_members am
            JOIN pg_catalog.pg_roles m ON m.oid = am.member
            WHERE am.roleid = r.oid
            ORDER BY 1
        ) AS members
    FROM pg_catalog.pg_roles r
    ORDER BY r.rolname
"#;

const RELOAD_SQL: &str = "SELECT pg_catalog.pg_reload_conf()";

/// User tables of the connected database, by schema then name.
pub async fn list_tables(session: &PgSession) -> Result<Vec<TableInfo>, PgToolsError> {
    let rows = session
        .query(&tables_sql(), &[])
        .await
        .map_err(|e| e.into_catalog(&format!("tables of {}", session.database())))?;
    rows.iter()
        .map(|row| {
            Ok(TableInfo {
                schema: column(row, "schema")?,
                name: column(row, "name")?,
                owner: column(row, "owner")?,
                live_rows: column(row, "live_rows")?,
                total_size: column(row, "total_size")?,
                table_size: column(row, "table_size")?,
                index_size: column(row, "index_size")?,
                toast_size: column(row, "toast_size")?,
                has_primary_key: column(row, "has_primary_key")?,
            })
        })
        .collect()
}

/// Schemas of the connected database, `pg_*` and `information_schema` excluded.
pub async fn list_schemas(session: &PgSession) -> Result<Vec<SchemaInfo>, PgToolsError> {
    let rows = session
        .query(SCHEMAS_SQL, &[])
        .await
        .map_err(|e| e.into_catalog(&format!("schemas of {}", session.database())))?;
    rows.iter()
        .map(|row| {
            Ok(SchemaInfo {
                name: column(row, "name")?,
                owner: column(row, "owner")?,
                tables: column(row, "tables")?,
                views: column(row, "views")?,
                size: column(row, "size")?,
            })
        })
        .collect()
}

/// Server sessions, oldest first.
pub async fn list_sessions(session: &PgSession) -> Result<Vec<SessionInfo>, PgToolsError> {
    let rows = session.query(SESSIONS_SQL, &[]).await.map_err(|e| e.into_catalog("session list"))?;
    rows.iter()
        .map(|row| {
            Ok(SessionInfo {
                pid: column(row, "pid")?,
                user: column(row, "user_name")?,
                database: column(row, "database")?,
                application: column(row, "application")?,
                client_addr: column(row, "client_addr")?,
                client_port: column(row, "client_port")?,
                backend_start: column(row, "backend_start")?,
                state: column(row, "state")?,
                wait_event_type: column(row, "wait_event_type")?,
                wait_event: column(row, "wait_event")?,
                query: column(row, "query")?,
            })
        })
        .collect()
}

/// Every role visible in `pg_roles`, system roles included.
pub async fn list_roles(session: &PgSession) -> Result<Vec<RoleInfo>, PgToolsError> {
    let to_role_error = |e: PgToolsError| e.retag(|message| PgToolsError::RoleQuery { message });
    let rows = session.query(ROLES_SQL, &[]).await.map_err(to_role_error)?;
    rows.iter()
        .map(|row| {
            Ok(RoleInfo {
                name: column(row, "name")?,
                login: column(row, "rolcanlogin")?,
                superuser: column(row, "rolsuper")?,
                create_db: column(row, "rolcreatedb")?,
                create_role: column(row, "rolcreaterole")?,
                inherit: column(row, "rolinherit")?,
                replication: column(row, "rolreplication")?,
                bypass_rls: column(row, "rolbypassrls")?,
                members: column(row, "members")?,
            })
        })
        .collect::<Result<Vec<_>, PgToolsError>>()
        .map_err(to_role_error)
}

/// Ask the server to re-read its configuration files.
pub async fn reload_config(session: &PgSession) -> Result<(), PgToolsError> {
    let row = session.query_one(RELOAD_SQL, &[]).await.map_err(|e| e.into_execution(RELOAD_SQL))?;
    let signalled: bool = row.try_get(0).map_err(|e| PgToolsError::scan(e.to_string()))?;
    if !signalled {
        return Err(PgToolsError::execution(RELOAD_SQL, "server did not accept the reload signal"));
    }
    tracing::info!("Server configuration reloaded");
    Ok(())
}

/// `CREATE DATABASE`, optionally owned by `owner`.
pub async fn create_database(
    session: &PgSession,
    name: &str,
    owner: Option<&str>,
) -> Result<(), PgToolsError> {
    let mut sql = format!("CREATE DATABASE {}", quote_identifier(name));
    if let Some(owner) = owner {
        sql.push_str(&format!(" OWNER {}", quote_identifier(owner)));
    }
    session.batch_execute(&sql).await.map_err(|e| e.into_execution(&sql))?;
    tracing::info!(database = name, "Database created");
    Ok(())
}

/// `DROP DATABASE`.
///
/// With `force`, `WITH (FORCE)` is tried first; servers that do not support
/// it get their sessions on the database terminated before a plain drop.
pub async fn drop_database(session: &PgSession, name: &str, force: bool) -> Result<(), PgToolsError> {
    let plain = format!("DROP DATABASE IF EXISTS {}", quote_identifier(name));
    if force {
        let forced = format!("{plain} WITH (FORCE)");
        match session.batch_execute(&forced).await {
            Ok(()) => {
                tracing::info!(database = name, "Database dropped (forced)");
                return Ok(());
            }
            Err(e) if e.pg_code() == Some("42601") => {
                tracing::debug!(database = name, "WITH (FORCE) unsupported, terminating sessions");
                session
                    .execute(
                        "SELECT pg_catalog.pg_terminate_backend(pid) FROM pg_catalog.pg_stat_activity \
                         WHERE datname = $1 AND pid <> pg_catalog.pg_backend_pid()",
                        &[&name],
                    )
                    .await
                    .map_err(|e| e.into_catalog("terminate sessions"))?;
            }
            Err(e) => return Err(e.into_execution(&forced)),
        }
    }
    session.batch_execute(&plain).await.map_err(|e| e.into_execution(&plain))?;
    tracing::info!(database = name, "Database dropped");
    Ok(())
}
