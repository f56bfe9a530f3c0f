//! Data models for pgtools.
//!
//! - `connection` - DbConfig, SslMode
//! - `catalog` - Descriptors read from the catalog and the SQL they render to

pub mod catalog;
pub mod connection;

pub use catalog::{
    ColumnDescriptor, ConstraintStatement, DatabaseDescriptor, PrimaryKeyColumn, RoleDescriptor,
    SequenceDescriptor, SessionAttribute, TableRef, SESSION_ATTRIBUTE_NAMES, SYSTEM_SCHEMAS,
};
pub use connection::{DbConfig, SslMode, DEFAULT_MAINTENANCE_DB};
