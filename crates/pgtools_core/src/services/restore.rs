//! Restore interpreter.
//!
//! A line-oriented reader rebuilds statements from an archive, and the driver
//! executes them one at a time against the target server, switching databases
//! when the archive says `\c <name>`.
//!
//! The lexer is deliberately naive: a statement ends at the first line whose
//! trimmed form ends with `;`, and only whole-line `--` comments are skipped.
//! Archives written by this tool never contain multi-line literals.

use async_trait::async_trait;
use std::time::Instant;

use crate::archive::{ArchivePath, ArchiveReader};
use crate::error::PgToolsError;
use crate::quote::unquote_identifier;
use crate::services::connection::{Connector, PgSession};

/// Catalog tables whose mention marks a statement as role-related.
pub const ROLE_CATALOG_TABLES: [&str; 4] = ["pg_roles", "pg_auth_members", "pg_shadow", "pg_user"];

/// Source of archive lines.
pub trait LineSource {
    /// Next line without its terminator; `None` at end of input.
    fn next_line(&mut self) -> Result<Option<String>, PgToolsError>;
}

impl LineSource for ArchiveReader {
    fn next_line(&mut self) -> Result<Option<String>, PgToolsError> {
        ArchiveReader::next_line(self)
    }
}

impl LineSource for std::vec::IntoIter<String> {
    fn next_line(&mut self) -> Result<Option<String>, PgToolsError> {
        Ok(self.next())
    }
}

/// One unit of work produced by [`StatementReader`].
///
/// `text` runs first, then the session switches to `reconnect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderItem {
    /// Complete statement, terminator included.
    pub text: Option<String>,
    /// Database to switch to once `text` has run.
    pub reconnect: Option<String>,
}

/// Rebuilds statements from archive lines.
pub struct StatementReader<L: LineSource> {
    lines: L,
    buffer: String,
    pending_reconnect: Option<String>,
}

impl<L: LineSource> StatementReader<L> {
    /// Read statements from `lines`.
    pub fn new(lines: L) -> Self {
        Self { lines, buffer: String::new(), pending_reconnect: None }
    }

    /// Next statement and/or reconnect; `None` once the input is exhausted.
    ///
    /// A statement still unterminated at end of input is dropped.
    pub fn next_statement(&mut self) -> Result<Option<ReaderItem>, PgToolsError> {
        loop {
            let Some(line) = self.lines.next_line()? else {
                if !self.buffer.trim().is_empty() {
                    tracing::warn!(
                        length = self.buffer.len(),
                        "Discarding unterminated statement at end of archive"
                    );
                    self.buffer.clear();
                }
                return Ok(self
                    .pending_reconnect
                    .take()
                    .map(|target| ReaderItem { text: None, reconnect: Some(target) }));
            };

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }

            if let Some(target) = parse_reconnect(trimmed) {
                if self.buffer.is_empty() {
                    return Ok(Some(ReaderItem { text: None, reconnect: Some(target) }));
                }
                if let Some(replaced) = self.pending_reconnect.replace(target.clone()) {
                    tracing::warn!(
                        replaced = %replaced,
                        target = %target,
                        "Second reconnect inside an unfinished statement, only the last one applies"
                    );
                } else {
                    tracing::debug!(target = %target, "Reconnect deferred until pending statement runs");
                }
                continue;
            }

            self.buffer.push_str(trimmed);
            self.buffer.push(' ');
            if trimmed.ends_with(';') {
                let text = std::mem::take(&mut self.buffer).trim_end().to_string();
                return Ok(Some(ReaderItem { text: Some(text), reconnect: self.pending_reconnect.take() }));
            }
        }
    }
}

/// Target database of a `\c` / `\connect` line, quotes stripped.
pub fn parse_reconnect(line: &str) -> Option<String> {
    let rest = line.strip_prefix("\\connect ").or_else(|| line.strip_prefix("\\c "))?.trim();
    if rest.is_empty() {
        return None;
    }
    let name = if rest.starts_with('"') {
        let end = closing_quote(rest).unwrap_or(rest.len());
        unquote_identifier(&rest[..end])
    } else {
        rest.split_whitespace().next().unwrap_or(rest).to_string()
    };
    Some(name)
}

/// Byte index one past the closing quote of a quoted identifier at the start of `text`.
fn closing_quote(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Whether `sql` passes the roles-only filter.
///
/// Statements that mention a role catalog table always pass. With
/// `include_ddl`, role DDL passes too (see [`is_role_ddl`]).
pub fn is_role_statement(sql: &str, include_ddl: bool) -> bool {
    ROLE_CATALOG_TABLES.iter().any(|table| sql.contains(table)) || (include_ddl && is_role_ddl(sql))
}

/// `CREATE|ALTER|DROP ROLE|USER`, user mappings excluded.
pub fn is_role_ddl(sql: &str) -> bool {
    let words: Vec<String> = sql.split_whitespace().take(3).map(|w| w.to_ascii_uppercase()).collect();
    match words.as_slice() {
        [verb, noun, rest @ ..] => {
            matches!(verb.as_str(), "CREATE" | "ALTER" | "DROP")
                && matches!(noun.as_str(), "ROLE" | "USER")
                && rest.first().map(String::as_str) != Some("MAPPING")
        }
        _ => false,
    }
}

/// Executes restore statements.
#[async_trait]
pub trait StatementTarget: Send + Sync {
    /// Execute one statement; failures carry the statement text.
    async fn execute_statement(&self, sql: &str) -> Result<(), PgToolsError>;
}

#[async_trait]
impl StatementTarget for PgSession {
    async fn execute_statement(&self, sql: &str) -> Result<(), PgToolsError> {
        self.batch_execute(sql).await.map_err(|e| e.into_execution(sql))
    }
}

/// Restore behavior.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Execute only role-related statements.
    pub roles_only: bool,
    /// Under `roles_only`, also keep role DDL such as the `CREATE ROLE`
    /// lines of a role dump. Off means catalog-table mentions only.
    pub role_ddl: bool,
    /// Database the restore starts connected to.
    pub maintenance_db: String,
}

/// Outcome of one restored archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Archive path.
    pub archive: String,
    /// Statements executed.
    pub executed: u64,
    /// Statements dropped by the roles-only filter.
    pub skipped: u64,
    /// Database switches performed.
    pub reconnects: u64,
}

/// Execute every statement from `reader`, in order, stopping at the first failure.
pub async fn run_statements<C, L>(
    connector: &C,
    mut reader: StatementReader<L>,
    options: &RestoreOptions,
    label: &str,
) -> Result<RestoreSummary, PgToolsError>
where
    C: Connector,
    C::Session: StatementTarget,
    L: LineSource,
{
    let mut summary = RestoreSummary { archive: label.to_string(), ..Default::default() };
    let mut session = Some(connector.connect(&options.maintenance_db).await?);

    while let Some(item) = reader.next_statement()? {
        if let Some(sql) = item.text {
            if options.roles_only && !is_role_statement(&sql, options.role_ddl) {
                summary.skipped += 1;
            } else {
                let current = session
                    .as_ref()
                    .ok_or_else(|| PgToolsError::internal("restore lost its session"))?;
                if let Err(e) = current.execute_statement(&sql).await {
                    tracing::error!(archive = label, error = %e, "Restore aborted");
                    return Err(e);
                }
                summary.executed += 1;
            }
        }

        if let Some(target) = item.reconnect {
            tracing::info!(database = %target, "Switching database");
            drop(session.take());
            session = Some(connector.connect(&target).await?);
            summary.reconnects += 1;
        }
    }

    Ok(summary)
}

/// Restore one archive file.
pub async fn restore_archive<C>(
    connector: &C,
    archive: &ArchivePath,
    options: &RestoreOptions,
) -> Result<RestoreSummary, PgToolsError>
where
    C: Connector,
    C::Session: StatementTarget,
{
    let started = Instant::now();
    tracing::info!(archive = %archive.display(), roles_only = options.roles_only, "Restoring archive");
    let reader = ArchiveReader::open(archive)?;
    let summary = run_statements(connector, StatementReader::new(reader), options, &archive.display()).await?;
    tracing::info!(
        archive = %archive.display(),
        executed = summary.executed,
        skipped = summary.skipped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Archive restored"
    );
    Ok(summary)
}

/// Restore several archives in order; a failure stops the remaining ones.
pub async fn restore_archives<C>(
    connector: &C,
    paths: &[String],
    options: &RestoreOptions,
) -> Result<Vec<RestoreSummary>, PgToolsError>
where
    C: Connector,
    C::Session: StatementTarget,
{
    if paths.is_empty() {
        return Err(PgToolsError::invalid_arguments("no archive given"));
    }
    let mut summaries = Vec::with_capacity(paths.len());
    for path in paths {
        summaries.push(restore_archive(connector, &ArchivePath::for_restore(path), options).await?);
    }
    Ok(summaries)
}
