//! Database sessions over tokio-postgres.
//!
//! Provides:
//! - The `Connector` seam the dump and restore paths are written against
//! - `PgConnector`, building a TLS-aware `tokio_postgres::Config` per database
//! - `PgSession`, a single connection whose calls all observe cancellation
//!
//! There is no pooling and no retry: one failed connect is fatal to the
//! operation that asked for it.

use crate::error::PgToolsError;
use crate::models::{DbConfig, SslMode};

use async_trait::async_trait;
use futures_util::StreamExt;
use native_tls::{Certificate, Identity, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tokio::select;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tokio_util::sync::CancellationToken;

/// Connect timeout applied to every connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const APPLICATION_NAME: &str = "pgtools";

/// Yields an authenticated session for a named database.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Session type handed out by this connector.
    type Session: Send + Sync;

    /// Open a new session on `database`.
    async fn connect(&self, database: &str) -> Result<Self::Session, PgToolsError>;
}

/// Connector for a real PostgreSQL server.
pub struct PgConnector {
    config: DbConfig,
    cancel: CancellationToken,
}

impl PgConnector {
    /// Create a connector whose sessions observe `cancel`.
    pub fn new(config: DbConfig, cancel: CancellationToken) -> Result<Self, PgToolsError> {
        config.validate().map_err(PgToolsError::config)?;
        Ok(Self { config, cancel })
    }

    /// Target configuration.
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    fn pg_config(&self, database: &str) -> tokio_postgres::Config {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&self.config.host);
        pg_config.port(self.config.port);
        pg_config.dbname(database);
        pg_config.user(&self.config.user);
        if !self.config.password.is_empty() {
            pg_config.password(&self.config.password);
        }
        pg_config.application_name(APPLICATION_NAME);
        pg_config.connect_timeout(CONNECT_TIMEOUT);
        pg_config.ssl_mode(match self.config.sslmode {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                tokio_postgres::config::SslMode::Require
            }
        });
        pg_config
    }

    /// Build the TLS connector for the configured mode; `None` means plain TCP.
    fn tls(&self) -> Result<Option<MakeTlsConnector>, PgToolsError> {
        let mut builder = TlsConnector::builder();
        match self.config.sslmode {
            SslMode::Disable => return Ok(None),
            SslMode::Prefer | SslMode::Require => {
                // Only verify-ca and verify-full check certificates.
                builder.danger_accept_invalid_certs(true);
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                if let Some(path) = &self.config.sslrootcert {
                    let pem = std::fs::read(path).map_err(|e| {
                        PgToolsError::config(format!(
                            "Failed to read CA certificate {}: {e}",
                            path.display()
                        ))
                    })?;
                    let cert = Certificate::from_pem(&pem).map_err(|e| {
                        PgToolsError::config(format!("Failed to parse CA certificate: {e}"))
                    })?;
                    builder.add_root_certificate(cert);
                }
                if self.config.sslmode == SslMode::VerifyCa {
                    builder.danger_accept_invalid_hostnames(true);
                }
            }
        }

        if let (Some(cert_path), Some(key_path)) =
            (&self.config.sslclientcert, &self.config.sslclientkey)
        {
            let read = |path: &std::path::Path| {
                std::fs::read(path).map_err(|e| {
                    PgToolsError::config(format!("Failed to read {}: {e}", path.display()))
                })
            };
            let identity = Identity::from_pkcs8(&read(cert_path)?, &read(key_path)?).map_err(|e| {
                PgToolsError::config(format!("Failed to load client certificate: {e}"))
            })?;
            builder.identity(identity);
        }

        let connector = builder
            .build()
            .map_err(|e| PgToolsError::config(format!("Failed to create TLS connector: {e}")))?;
        Ok(Some(MakeTlsConnector::new(connector)))
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Session = PgSession;

    async fn connect(&self, database: &str) -> Result<PgSession, PgToolsError> {
        tracing::debug!(url = %self.config.display_url(database), "Connecting");

        let pg_config = self.pg_config(database);
        let tls = self.tls()?;
        let connect_error = |e: tokio_postgres::Error| {
            PgToolsError::connection_with_source(
                format!("Cannot connect to {}: {e}", self.config.display_url(database)),
                e,
            )
        };

        let client = match &tls {
            None => {
                let connecting = pg_config.connect(NoTls);
                let (client, connection) = select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(PgToolsError::cancelled("connect")),
                    result = connecting => result.map_err(connect_error)?,
                };
                spawn_driver(connection, database);
                client
            }
            Some(tls) => {
                let connecting = pg_config.connect(tls.clone());
                let (client, connection) = select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(PgToolsError::cancelled("connect")),
                    result = connecting => result.map_err(connect_error)?,
                };
                spawn_driver(connection, database);
                client
            }
        };

        tracing::info!(database, host = %self.config.host, "Connected");
        Ok(PgSession { client, database: database.to_string(), cancel: self.cancel.clone(), tls })
    }
}

fn spawn_driver<S, T>(connection: tokio_postgres::Connection<S, T>, database: &str)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let database = database.to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(database = %database, error = %e, "Connection closed with error");
        }
    });
}

/// One open connection to one database.
///
/// Dropping the session closes the connection.
pub struct PgSession {
    client: Client,
    database: String,
    cancel: CancellationToken,
    tls: Option<MakeTlsConnector>,
}

impl PgSession {
    /// Database this session is connected to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Run `fut` unless the operation is cancelled first.
    async fn guarded<T, F>(&self, fut: F) -> Result<T, PgToolsError>
    where
        F: Future<Output = Result<T, tokio_postgres::Error>>,
    {
        select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.cancel_server_side().await;
                Err(PgToolsError::cancelled(format!("operation on database '{}' interrupted", self.database)))
            }
            result = fut => result.map_err(PgToolsError::from),
        }
    }

    async fn cancel_server_side(&self) {
        let token = self.client.cancel_token();
        let result = match &self.tls {
            Some(tls) => token.cancel_query(tls.clone()).await,
            None => token.cancel_query(NoTls).await,
        };
        if let Err(e) = result {
            tracing::warn!(database = %self.database, error = %e, "Failed to send cancel request");
        }
    }

    /// Execute a query that returns rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, PgToolsError> {
        self.guarded(self.client.query(sql, params)).await
    }

    /// Execute a query returning exactly one row.
    pub async fn query_one(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Row, PgToolsError> {
        self.guarded(self.client.query_one(sql, params)).await
    }

    /// Execute a statement that doesn't return rows.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, PgToolsError> {
        self.guarded(self.client.execute(sql, params)).await
    }

    /// Execute raw SQL text through the simple query protocol.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), PgToolsError> {
        self.guarded(self.client.batch_execute(sql)).await
    }

    /// Stream every row of `sql` as text values, one row at a time.
    ///
    /// `on_row` sees each row before the next one is read from the socket.
    /// Returns the number of rows streamed.
    pub async fn stream_text_rows(
        &self,
        sql: &str,
        on_row: &mut (dyn FnMut(Vec<Option<String>>) -> Result<(), PgToolsError> + Send),
    ) -> Result<u64, PgToolsError> {
        let stream = self.guarded(self.client.query_raw(sql, std::iter::empty::<&str>())).await?;
        let mut stream = pin!(stream);
        let mut count: u64 = 0;

        loop {
            let next = select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.cancel_server_side().await;
                    tracing::debug!(database = %self.database, rows = count, "Row stream cancelled");
                    return Err(PgToolsError::cancelled(format!(
                        "row stream on database '{}' interrupted",
                        self.database
                    )));
                }
                next = stream.next() => next,
            };
            let Some(row) = next else { break };
            let row = row.map_err(|e| PgToolsError::scan(e.to_string()))?;
            on_row(text_values(&row)?)?;
            count += 1;
        }
        Ok(count)
    }
}

/// Read every column of `row` as nullable text.
pub fn text_values(row: &Row) -> Result<Vec<Option<String>>, PgToolsError> {
    (0..row.len())
        .map(|idx| {
            row.try_get::<_, Option<String>>(idx).map_err(|e| {
                PgToolsError::scan(format!("column {}: {e}", row.columns()[idx].name()))
            })
        })
        .collect()
}

/// Read a named column, mapping type mismatches to `Scan`.
pub fn column<'a, T>(row: &'a Row, name: &str) -> Result<T, PgToolsError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name).map_err(|e| PgToolsError::scan(format!("column {name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_rejects_invalid_config() {
        let config = DbConfig::new("", "postgres");
        let err = PgConnector::new(config, CancellationToken::new()).err().unwrap();
        assert_eq!(err.code(), 10);
    }

    #[test]
    fn test_pg_config_uses_target_database() {
        let mut config = DbConfig::new("db.internal", "admin");
        config.port = 5433;
        config.sslmode = SslMode::Disable;
        let connector = PgConnector::new(config, CancellationToken::new()).unwrap();
        let pg_config = connector.pg_config("shop");
        assert_eq!(pg_config.get_dbname(), Some("shop"));
        assert_eq!(pg_config.get_ports(), &[5433]);
        assert_eq!(pg_config.get_user(), Some("admin"));
        assert_eq!(pg_config.get_connect_timeout(), Some(&CONNECT_TIMEOUT));
        assert!(connector.tls().unwrap().is_none());
    }

    #[test]
    fn test_missing_root_cert_is_config_error() {
        let mut config = DbConfig::new("localhost", "postgres");
        config.sslmode = SslMode::VerifyFull;
        config.sslrootcert = Some("/nonexistent/root.crt".into());
        let connector = PgConnector::new(config, CancellationToken::new()).unwrap();
        let err = connector.tls().err().unwrap();
        assert!(matches!(err, PgToolsError::Config { .. }));
    }

    #[tokio::test]
    async fn test_connect_observes_cancellation() {
        let mut config = DbConfig::new("10.255.255.1", "postgres");
        config.sslmode = SslMode::Disable;
        let token = CancellationToken::new();
        token.cancel();
        let connector = PgConnector::new(config, token).unwrap();
        let err = connector.connect("postgres").await.err().unwrap();
        assert!(err.is_cancelled());
    }
}
