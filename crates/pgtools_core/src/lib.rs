//! Core of pgtools: logical dump and restore of PostgreSQL databases.
//!
//! This crate provides:
//!
//! - **error**: Error type with stable numeric codes
//! - **quote**: Identifier and literal quoting
//! - **archive**: Archive naming policy and plain/gzip archive I/O
//! - **models**: Connection targets and catalog descriptors
//! - **services**: Connector, catalog extractor, dump writer, restore interpreter,
//!   cancellation, environment files, admin queries
//! - **logging**: Structured logging setup

pub mod archive;
pub mod error;
pub mod logging;
pub mod models;
pub mod quote;
pub mod services;

mod verification_tests;

pub use archive::{resolve_archive_name, ArchivePath, ArchiveReader, ArchiveWriter};
pub use error::PgToolsError;
pub use models::{DbConfig, SslMode};
pub use services::{
    restore_archives, write_archive, CancelScope, Connector, DumpRequest, DumpTarget,
    EnvironmentStore, PgConnector, PgSession, RestoreOptions,
};
