//! Backend services for pgtools.
//!
//! - `connection` - Connector seam, tokio-postgres sessions with cancellation
//! - `catalog` - Catalog extraction for dumps
//! - `dump` - Dump writer and backup driver
//! - `restore` - Statement reader and restore driver
//! - `cancel` - Signal/deadline cancellation watcher
//! - `environment` - Environment (target server) files
//! - `admin` - Single-statement database administration

pub mod admin;
pub mod cancel;
pub mod catalog;
pub mod connection;
pub mod dump;
pub mod environment;
pub mod restore;

pub use cancel::CancelScope;
pub use catalog::CatalogSource;
pub use connection::{Connector, PgConnector, PgSession};
pub use dump::{write_archive, DumpRequest, DumpSummary, DumpTarget, DumpWriter};
pub use environment::{EnvironmentStore, DEFAULT_ENVIRONMENT};
pub use restore::{
    restore_archive, restore_archives, RestoreOptions, RestoreSummary, StatementReader,
    StatementTarget,
};
