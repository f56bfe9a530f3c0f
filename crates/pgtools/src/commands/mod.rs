//! Command handlers.
//!
//! Each handler loads the selected environment, opens a cancellation scope and
//! calls into `pgtools_core`. Results go to stdout; errors are returned to
//! `main` for reporting.

pub mod backup;
pub mod db;
pub mod env;
pub mod restore;
pub mod roles;
pub mod srv;

use std::time::Duration;

use pgtools_core::{CancelScope, EnvironmentStore, PgConnector, PgToolsError};

/// Settings shared by every command.
#[derive(Debug)]
pub struct Context {
    /// Environment name from `-e/--env`
    pub env: String,
    /// Operation deadline from `--timeout`
    pub timeout: Option<Duration>,
}

impl Context {
    pub fn store(&self) -> Result<EnvironmentStore, PgToolsError> {
        EnvironmentStore::open_default()
    }

    /// Connector for the selected environment. Does not connect.
    pub fn connector(&self, scope: &CancelScope) -> Result<PgConnector, PgToolsError> {
        let config = self.store()?.load(&self.env)?;
        tracing::debug!(env = %self.env, target = %config.display_url(config.maintenance_db()), "Using environment");
        PgConnector::new(config, scope.token())
    }

    pub fn cancel_scope(&self) -> CancelScope {
        CancelScope::new(self.timeout)
    }
}

/// Replace a generic cancellation error with the reason the scope fired.
pub fn explain_cancel<T>(scope: &CancelScope, result: Result<T, PgToolsError>) -> Result<T, PgToolsError> {
    match result {
        Err(e) if e.is_cancelled() => Err(scope.reason().map(PgToolsError::cancelled).unwrap_or(e)),
        other => other,
    }
}
