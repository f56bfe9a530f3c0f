//! Dump writer.
//!
//! Turns catalog descriptors and row streams into a replayable SQL script.
//! Rows go straight from the server cursor to the output, one `INSERT` per
//! row; nothing holds more than the row being written.

use std::collections::BTreeSet;
use std::io::Write;
use std::time::Instant;

use crate::archive::{ArchivePath, ArchiveWriter};
use crate::error::PgToolsError;
use crate::models::TableRef;
use crate::quote::quote_identifier;
use crate::services::catalog::CatalogSource;
use crate::services::connection::Connector;

/// What a dump covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpTarget {
    /// Server-wide roles only.
    Roles,
    /// The named databases, in the given order.
    Databases(Vec<String>),
    /// Every non-template database except the maintenance one, in name order.
    AllDatabases,
}

/// One backup request.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    /// What to dump.
    pub target: DumpTarget,
    /// Archive name as typed by the user; normalized before use.
    pub archive: String,
    /// Emit only `BEGIN`/`INSERT`/`COMMIT` per table (no DDL, no constraints).
    pub data_only: bool,
    /// Database used for role dumps and database discovery.
    pub maintenance_db: String,
}

/// Outcome of a finished dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpSummary {
    /// Final archive path.
    pub archive: String,
    /// Databases dumped, in order.
    pub databases: Vec<String>,
    /// Tables dumped across all databases.
    pub tables: usize,
    /// Rows dumped across all databases.
    pub rows: u64,
    /// Roles dumped.
    pub roles: usize,
}

/// Writes dump statements to an output stream.
pub struct DumpWriter<'a, W: Write + Send> {
    out: &'a mut W,
    label: String,
    tables: usize,
    rows: u64,
    roles: usize,
}

impl<'a, W: Write + Send> DumpWriter<'a, W> {
    /// Wrap `out`; `label` names the output in write errors.
    pub fn new(out: &'a mut W, label: impl Into<String>) -> Self {
        Self { out, label: label.into(), tables: 0, rows: 0, roles: 0 }
    }

    /// Tables written so far.
    pub fn tables_written(&self) -> usize {
        self.tables
    }

    /// Rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    fn line(&mut self, text: &str) -> Result<(), PgToolsError> {
        writeln!(self.out, "{text}").map_err(|e| PgToolsError::archive_write(&self.label, e.to_string()))
    }

    fn blank(&mut self) -> Result<(), PgToolsError> {
        self.line("")
    }

    fn header(&mut self, title: &str) -> Result<(), PgToolsError> {
        self.line(&format!("-- {title}"))?;
        self.line(&format!(
            "-- Dump created with pgtools on {}",
            chrono::Local::now().format("%Y.%m.%d %H:%M:%S")
        ))?;
        self.blank()
    }

    /// Emit `CREATE ROLE` / `ALTER ROLE` for every non-system role.
    ///
    /// The superuser check happens before anything is written.
    pub async fn write_global_roles<S: CatalogSource>(&mut self, source: &S) -> Result<(), PgToolsError> {
        ensure_superuser(source).await?;
        let roles = source.roles().await?;

        self.line("-- Global roles and users")?;
        self.line(&format!(
            "-- Dump created with pgtools on {}",
            chrono::Local::now().format("%Y.%m.%d %H:%M:%S")
        ))?;
        self.blank()?;
        for role in roles.iter().filter(|r| !r.name.starts_with("pg_")) {
            let [create, alter] = role.statements();
            self.line(&create)?;
            self.line(&alter)?;
            self.roles += 1;
        }
        tracing::info!(roles = self.roles, "Roles dumped");
        Ok(())
    }

    /// Emit the full reconstruction script of one database.
    pub async fn write_database<S: CatalogSource>(
        &mut self,
        source: &S,
        db_name: &str,
    ) -> Result<(), PgToolsError> {
        tracing::info!(database = db_name, "Dumping database");
        let descriptor = source.database_descriptor(db_name).await?;
        let attributes = source.session_attributes().await?;

        self.header(&format!("Dump of database: {db_name}"))?;
        self.line(&format!("DROP DATABASE IF EXISTS {};", quote_identifier(db_name)))?;
        self.line(&descriptor.create_statement())?;
        self.line(&format!("\\c {}", quote_identifier(db_name)))?;
        self.blank()?;
        for attribute in &attributes {
            self.line(&attribute.set_statement())?;
        }
        self.blank()?;
        self.line(&format!(
            "ALTER DATABASE {} OWNER TO {};",
            quote_identifier(db_name),
            quote_identifier(&descriptor.owner)
        ))?;

        for sequence in source.sequences().await? {
            self.line(&sequence.create_statement())?;
            self.line(&sequence.owner_statement(&descriptor.owner))?;
            if let Some(setval) = sequence.setval_statement() {
                self.line(&setval)?;
            }
        }

        let tables = source.tables().await?;
        self.create_schemas(&tables)?;
        for table in &tables {
            let columns = source.columns(table).await?;
            self.blank()?;
            self.line(&table.drop_statement())?;
            self.line(&table.create_statement(&columns))?;
            self.dump_rows(source, table, &columns).await?;
        }

        let constraints = source.constraints().await?;
        if !constraints.is_empty() {
            self.blank()?;
        }
        for constraint in &constraints {
            self.line(&constraint.to_sql())?;
        }
        self.blank()?;
        Ok(())
    }

    /// Emit rows only: one transaction of INSERTs per table.
    pub async fn write_database_data<S: CatalogSource>(
        &mut self,
        source: &S,
        db_name: &str,
    ) -> Result<(), PgToolsError> {
        tracing::info!(database = db_name, "Dumping database data");
        self.header(&format!("Data-only dump of database: {db_name}"))?;
        self.line(&format!("\\c {}", quote_identifier(db_name)))?;

        for sequence in source.sequences().await? {
            if let Some(setval) = sequence.setval_statement() {
                self.line(&setval)?;
            }
        }

        for table in source.tables().await? {
            let columns = source.columns(&table).await?;
            self.blank()?;
            self.line("BEGIN;")?;
            self.dump_rows(source, &table, &columns).await?;
            self.line("COMMIT;")?;
        }
        self.blank()?;
        Ok(())
    }

    fn create_schemas(&mut self, tables: &[TableRef]) -> Result<(), PgToolsError> {
        let schemas: BTreeSet<&str> =
            tables.iter().map(|t| t.schema.as_str()).filter(|s| *s != "public").collect();
        if schemas.is_empty() {
            return Ok(());
        }
        self.blank()?;
        for schema in schemas {
            self.line(&format!("CREATE SCHEMA IF NOT EXISTS {};", quote_identifier(schema)))?;
        }
        Ok(())
    }

    async fn dump_rows<S: CatalogSource>(
        &mut self,
        source: &S,
        table: &TableRef,
        columns: &[crate::models::ColumnDescriptor],
    ) -> Result<(), PgToolsError> {
        let out = &mut *self.out;
        let label = self.label.as_str();
        let mut on_row = |values: Vec<Option<String>>| {
            writeln!(out, "{}", table.insert_statement(&values))
                .map_err(|e| PgToolsError::archive_write(label, e.to_string()))
        };
        let count = source.stream_rows(table, columns, &mut on_row).await?;

        tracing::info!(schema = %table.schema, table = %table.name, rows = count, "Table dumped");
        self.tables += 1;
        self.rows += count;
        Ok(())
    }
}

async fn ensure_superuser<S: CatalogSource>(source: &S) -> Result<(), PgToolsError> {
    if source.is_superuser().await? {
        Ok(())
    } else {
        Err(PgToolsError::privilege_required("dumping roles requires a superuser connection"))
    }
}

/// Run a backup: resolve the archive name, open it, dump every target.
///
/// One connection is open at a time. On failure the partial archive stays on
/// disk.
pub async fn write_archive<C>(connector: &C, request: &DumpRequest) -> Result<DumpSummary, PgToolsError>
where
    C: Connector,
    C::Session: CatalogSource,
{
    let archive = ArchivePath::for_backup(&request.archive);
    let started = Instant::now();

    let databases = match &request.target {
        DumpTarget::Roles => {
            let session = connector.connect(&request.maintenance_db).await?;
            ensure_superuser(&session).await?;
            let mut file = ArchiveWriter::create(&archive)?;
            let mut writer = DumpWriter::new(&mut file, archive.display());
            writer.write_global_roles(&session).await?;
            let roles = writer.roles;
            drop(session);
            file.finish()?;
            tracing::info!(archive = %archive.display(), roles, "Role dump complete");
            return Ok(DumpSummary {
                archive: archive.display(),
                databases: Vec::new(),
                tables: 0,
                rows: 0,
                roles,
            });
        }
        DumpTarget::Databases(names) if names.is_empty() => {
            return Err(PgToolsError::invalid_arguments("no database names given"));
        }
        DumpTarget::Databases(names) => names.clone(),
        DumpTarget::AllDatabases => {
            let session = connector.connect(&request.maintenance_db).await?;
            let mut names = session.database_names().await?;
            // A restore starts on the maintenance database and cannot drop it.
            names.retain(|name| *name != request.maintenance_db);
            tracing::debug!(skipped = %request.maintenance_db, count = names.len(), "Dumping all databases");
            names
        }
    };

    let mut file = ArchiveWriter::create(&archive)?;
    let mut writer = DumpWriter::new(&mut file, archive.display());
    for db_name in &databases {
        let session = connector.connect(db_name).await?;
        let result = if request.data_only {
            writer.write_database_data(&session, db_name).await
        } else {
            writer.write_database(&session, db_name).await
        };
        if let Err(e) = result {
            tracing::error!(database = %db_name, archive = %archive.display(), error = %e, "Dump aborted");
            return Err(e);
        }
    }
    let (tables, rows) = (writer.tables, writer.rows);
    file.finish()?;

    tracing::info!(
        archive = %archive.display(),
        databases = databases.len(),
        tables,
        rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Dump complete"
    );
    Ok(DumpSummary { archive: archive.display(), databases, tables, rows, roles: 0 })
}
