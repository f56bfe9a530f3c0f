//! Connection target models.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Database the tool connects to when no specific database is involved.
pub const DEFAULT_MAINTENANCE_DB: &str = "postgres";

/// SSL mode for database connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// No SSL
    Disable,
    /// Use SSL if available (default)
    #[default]
    Prefer,
    /// Require SSL, accept any certificate
    Require,
    /// Require SSL, verify CA
    VerifyCa,
    /// Require SSL, verify CA and hostname
    VerifyFull,
}

impl SslMode {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "disable" => Self::Disable,
            "require" => Self::Require,
            "verify-ca" | "verify_ca" => Self::VerifyCa,
            "verify-full" | "verify_full" => Self::VerifyFull,
            _ => Self::Prefer,
        }
    }
}

/// Target server of an invocation, as stored in an environment file.
///
/// Immutable for the lifetime of one command.
#[derive(Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Server hostname or IP
    pub host: String,
    /// Server port (default 5432)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login username
    pub user: String,
    /// Login password
    #[serde(default)]
    pub password: String,
    /// SSL configuration
    #[serde(default, with = "ssl_mode_string")]
    pub sslmode: SslMode,
    /// CA certificate used by verify-ca / verify-full
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sslrootcert: Option<PathBuf>,
    /// Client certificate (PEM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sslclientcert: Option<PathBuf>,
    /// Client private key (PEM, PKCS#8)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sslclientkey: Option<PathBuf>,
    /// Free-form description
    #[serde(default, rename = "comment", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Maintenance database (default `postgres`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaultdb: Option<String>,
}

fn default_port() -> u16 {
    5432
}

/// Environment files store the SSL mode as a plain string and accept any
/// spelling `SslMode::parse` understands.
mod ssl_mode_string {
    use super::SslMode;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mode: &SslMode, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(mode.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SslMode, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SslMode::parse(&raw))
    }
}

impl DbConfig {
    /// Create a configuration with required fields and defaults elsewhere.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            password: String::new(),
            sslmode: SslMode::default(),
            sslrootcert: None,
            sslclientcert: None,
            sslclientkey: None,
            description: None,
            defaultdb: None,
        }
    }

    /// Maintenance database used for server-wide operations.
    pub fn maintenance_db(&self) -> &str {
        self.defaultdb.as_deref().filter(|db| !db.is_empty()).unwrap_or(DEFAULT_MAINTENANCE_DB)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host is required".to_string());
        }
        if self.port == 0 {
            return Err("Port must be between 1 and 65535".to_string());
        }
        if self.user.is_empty() {
            return Err("User is required".to_string());
        }
        if self.sslclientcert.is_some() != self.sslclientkey.is_some() {
            return Err("Client certificate and key must be given together".to_string());
        }
        Ok(())
    }

    /// Get the display connection string (without password).
    pub fn display_url(&self, database: &str) -> String {
        format!("postgresql://{}@{}:{}/{}", self.user, self.host, self.port, database)
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("sslmode", &self.sslmode)
            .field("defaultdb", &self.defaultdb)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_parse() {
        assert_eq!(SslMode::parse("require"), SslMode::Require);
        assert_eq!(SslMode::parse("VERIFY_FULL"), SslMode::VerifyFull);
        assert_eq!(SslMode::parse("bogus"), SslMode::Prefer);
        assert_eq!(SslMode::VerifyCa.as_str(), "verify-ca");
    }

    #[test]
    fn test_deserialize_environment_file() {
        let json = r#"{
            "host": "db.example.com",
            "port": 5433,
            "user": "admin",
            "password": "secret",
            "sslmode": "disable",
            "comment": "staging"
        }"#;
        let config: DbConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 5433);
        assert_eq!(config.sslmode, SslMode::Disable);
        assert_eq!(config.description.as_deref(), Some("staging"));
        assert_eq!(config.maintenance_db(), "postgres");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_hides_password() {
        let mut config = DbConfig::new("localhost", "postgres");
        config.password = "hunter2".to_string();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_validate_client_identity_pairs() {
        let mut config = DbConfig::new("localhost", "postgres");
        config.sslclientcert = Some(PathBuf::from("client.crt"));
        assert!(config.validate().is_err());
        config.sslclientkey = Some(PathBuf::from("client.key"));
        assert!(config.validate().is_ok());
    }
}
