//! Error types for pgtools.
//!
//! Every failure in the dump/restore engine is surfaced as a `PgToolsError`
//! carrying a stable numeric code, which the CLI turns into the process exit
//! status. Nothing here is retried.

use thiserror::Error;

/// Main error type for pgtools.
#[derive(Debug, Error)]
pub enum PgToolsError {
    /// Environment file missing, unreadable, or invalid.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Could not establish (or lost) a connection to a database.
    #[error("Connection failure: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A catalog/metadata query failed.
    #[error("Catalog query failed: {message}")]
    CatalogQuery {
        /// What was being queried.
        message: String,
        /// PostgreSQL SQLSTATE, when the server reported one.
        code: Option<String>,
    },

    /// Reading a row or column value failed.
    #[error("Scan failed: {message}")]
    Scan {
        /// Human-readable error message.
        message: String,
    },

    /// Database owner lookup failed.
    #[error("Ownership lookup failed: {message}")]
    OwnershipLookup {
        /// Human-readable error message.
        message: String,
    },

    /// Sequence enumeration failed.
    #[error("Sequence query failed: {message}")]
    SequenceQuery {
        /// Human-readable error message.
        message: String,
    },

    /// Role catalog query failed.
    #[error("Role query failed: {message}")]
    RoleQuery {
        /// Human-readable error message.
        message: String,
    },

    /// The connected role lacks a privilege the operation needs.
    #[error("Insufficient privileges: {message}")]
    PrivilegeRequired {
        /// Human-readable error message.
        message: String,
    },

    /// The archive file (or its compression wrapper) could not be opened or created.
    #[error("Cannot open archive '{path}': {message}")]
    ArchiveOpen {
        /// Archive path.
        path: String,
        /// Human-readable error message.
        message: String,
    },

    /// Writing to the archive failed.
    #[error("Cannot write archive '{path}': {message}")]
    ArchiveWrite {
        /// Archive path.
        path: String,
        /// Human-readable error message.
        message: String,
    },

    /// Reading a plain archive failed.
    #[error("Cannot read archive '{path}': {message}")]
    ArchiveRead {
        /// Archive path.
        path: String,
        /// Human-readable error message.
        message: String,
    },

    /// The gzip layer of a compressed archive failed.
    #[error("Decompression failed for '{path}': {message}")]
    Decompress {
        /// Archive path.
        path: String,
        /// Human-readable error message.
        message: String,
    },

    /// A restore statement failed on the target server.
    #[error("Statement execution failed: {message}\n{statement}")]
    Execution {
        /// The statement text as read from the archive.
        statement: String,
        /// Server error message.
        message: String,
        /// PostgreSQL SQLSTATE, when the server reported one.
        code: Option<String>,
    },

    /// The operation was interrupted by a signal or its deadline.
    #[error("Operation cancelled: {reason}")]
    Cancelled {
        /// Why the operation stopped.
        reason: String,
    },

    /// Missing or conflicting command-line arguments.
    #[error("Invalid arguments: {message}")]
    InvalidArguments {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

impl PgToolsError {
    // ========== Constructors ==========

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a new config error with source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new catalog query error.
    pub fn catalog_query(message: impl Into<String>) -> Self {
        Self::CatalogQuery { message: message.into(), code: None }
    }

    /// Create a new scan error.
    pub fn scan(message: impl Into<String>) -> Self {
        Self::Scan { message: message.into() }
    }

    /// Create a new privilege error.
    pub fn privilege_required(message: impl Into<String>) -> Self {
        Self::PrivilegeRequired { message: message.into() }
    }

    /// Create a new archive open error.
    pub fn archive_open(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArchiveOpen { path: path.into(), message: message.into() }
    }

    /// Create a new archive write error.
    pub fn archive_write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArchiveWrite { path: path.into(), message: message.into() }
    }

    /// Create a new archive read error.
    pub fn archive_read(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArchiveRead { path: path.into(), message: message.into() }
    }

    /// Create a new decompression error.
    pub fn decompress(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decompress { path: path.into(), message: message.into() }
    }

    /// Create a new execution error for a restore statement.
    pub fn execution(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution { statement: statement.into(), message: message.into(), code: None }
    }

    /// Create a cancellation error.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled { reason: reason.into() }
    }

    /// Create a new invalid-arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    // ========== Re-tagging ==========

    /// Re-tag a query-level failure as a catalog query failure.
    ///
    /// Connection and cancellation errors pass through unchanged so that the
    /// caller still sees why the session went away.
    pub fn into_catalog(self, what: &str) -> Self {
        match self {
            Self::CatalogQuery { message, code } => {
                Self::CatalogQuery { message: format!("{what}: {message}"), code }
            }
            Self::Scan { message } => Self::CatalogQuery { message: format!("{what}: {message}"), code: None },
            other => other,
        }
    }

    /// Re-tag a query-level failure as a restore execution failure of `statement`.
    pub fn into_execution(self, statement: &str) -> Self {
        match self {
            Self::CatalogQuery { message, code } => {
                Self::Execution { statement: statement.to_string(), message, code }
            }
            Self::Scan { message } => Self::execution(statement, message),
            other => other,
        }
    }

    /// Map a query-level failure onto one of the lookup-specific kinds.
    pub fn retag(self, wrap: fn(String) -> PgToolsError) -> Self {
        match self {
            Self::CatalogQuery { message, .. } | Self::Scan { message } => wrap(message),
            other => other,
        }
    }

    // ========== Methods ==========

    /// Numeric code for this error, used as the process exit status.
    pub fn code(&self) -> i32 {
        match self {
            Self::Config { .. } => 10,
            Self::Connection { .. } => 20,
            Self::CatalogQuery { .. } => 30,
            Self::Scan { .. } => 31,
            Self::OwnershipLookup { .. } => 32,
            Self::SequenceQuery { .. } => 33,
            Self::RoleQuery { .. } => 34,
            Self::PrivilegeRequired { .. } => 40,
            Self::ArchiveOpen { .. } => 50,
            Self::ArchiveWrite { .. } => 51,
            Self::ArchiveRead { .. } => 52,
            Self::Decompress { .. } => 53,
            Self::Execution { .. } => 60,
            Self::Cancelled { .. } => 70,
            Self::InvalidArguments { .. } => 80,
            Self::Internal { .. } => 99,
        }
    }

    /// Check if this error represents a cancelled operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "Config",
            Self::Connection { .. } => "Connection",
            Self::CatalogQuery { .. } | Self::Scan { .. } => "Catalog",
            Self::OwnershipLookup { .. } => "Catalog",
            Self::SequenceQuery { .. } => "Catalog",
            Self::RoleQuery { .. } => "Catalog",
            Self::PrivilegeRequired { .. } => "Privilege",
            Self::ArchiveOpen { .. } => "Archive",
            Self::ArchiveWrite { .. } => "Archive",
            Self::ArchiveRead { .. } => "Archive",
            Self::Decompress { .. } => "Archive",
            Self::Execution { .. } => "Restore",
            Self::Cancelled { .. } => "Cancelled",
            Self::InvalidArguments { .. } => "Arguments",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Config { .. } => Some("Create the environment with `pgtools env add`"),
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::PrivilegeRequired { .. } => Some("Connect as a superuser to dump roles"),
            Self::ArchiveOpen { .. } => Some("Check the archive path and file permissions"),
            Self::ArchiveWrite { .. } => Some("Check disk space; the partial archive was kept"),
            Self::Decompress { .. } => Some("The archive may not be gzip-compressed or is truncated"),
            Self::Execution { .. } => {
                Some("Fix the statement, truncate the archive before it, and resume")
            }
            Self::Internal { .. } => Some("Please report this issue"),
            _ => None,
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::CatalogQuery { code, .. } | Self::Execution { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to PgToolsError.
///
/// Server-side errors become `CatalogQuery` (callers re-tag them with
/// `into_catalog`, `into_execution` or `retag`); transport errors become
/// `Connection`.
impl From<tokio_postgres::Error> for PgToolsError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code_str = db_err.code().code();
            let mut message = db_err.message().to_string();
            if let Some(detail) = db_err.detail() {
                message.push_str(&format!(" ({detail})"));
            }

            if code_str.starts_with("08") {
                return PgToolsError::Connection { message, source: Some(Box::new(err)) };
            }
            return PgToolsError::CatalogQuery { message, code: Some(code_str.to_string()) };
        }

        if err.is_closed() {
            return PgToolsError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        PgToolsError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from std::io::Error to PgToolsError.
impl From<std::io::Error> for PgToolsError {
    fn from(err: std::io::Error) -> Self {
        PgToolsError::Config { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from serde_json::Error to PgToolsError.
impl From<serde_json::Error> for PgToolsError {
    fn from(err: serde_json::Error) -> Self {
        PgToolsError::Config {
            message: format!("JSON error: {err}"),
            source: Some(Box::new(err)),
        }
    }
}
