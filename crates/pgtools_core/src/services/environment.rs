//! Environment files.
//!
//! An environment is a named JSON file describing one target server. Files
//! live in `<config_dir>/pgtools/<name>.json` and hold the password, so they
//! are created owner-readable only on Unix.

use crate::error::PgToolsError;
use crate::models::DbConfig;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment used when none is named.
pub const DEFAULT_ENVIRONMENT: &str = "defaultEnv";

const EXTENSION: &str = ".json";

/// Directory holding environment files.
pub fn default_environment_dir() -> Result<PathBuf, PgToolsError> {
    dirs::config_dir()
        .map(|dir| dir.join("pgtools"))
        .ok_or_else(|| PgToolsError::config("Could not determine config directory"))
}

/// File name for environment `name`, `.json` appended when missing.
pub fn environment_file_name(name: &str) -> String {
    if name.ends_with(EXTENSION) {
        name.to_string()
    } else {
        format!("{name}{EXTENSION}")
    }
}

/// Named environment files in one directory.
#[derive(Debug, Clone)]
pub struct EnvironmentStore {
    dir: PathBuf,
}

impl EnvironmentStore {
    /// Store in the default config directory.
    pub fn open_default() -> Result<Self, PgToolsError> {
        Ok(Self::new(default_environment_dir()?))
    }

    /// Store in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory of this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of environment `name`.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(environment_file_name(name))
    }

    /// Load and validate environment `name`.
    pub fn load(&self, name: &str) -> Result<DbConfig, PgToolsError> {
        let path = self.path_of(name);
        let contents = fs::read_to_string(&path).map_err(|e| {
            PgToolsError::config_with_source(
                format!("Cannot read environment file {}", path.display()),
                e,
            )
        })?;
        let config: DbConfig = serde_json::from_str(&contents).map_err(|e| {
            PgToolsError::config_with_source(
                format!("Invalid environment file {}", path.display()),
                e,
            )
        })?;
        config.validate().map_err(|e| {
            PgToolsError::config(format!("Invalid environment file {}: {e}", path.display()))
        })?;
        tracing::debug!(environment = name, host = %config.host, "Environment loaded");
        Ok(config)
    }

    /// Write environment `name`, replacing any existing file.
    pub fn save(&self, name: &str, config: &DbConfig) -> Result<PathBuf, PgToolsError> {
        config.validate().map_err(PgToolsError::config)?;
        fs::create_dir_all(&self.dir).map_err(|e| {
            PgToolsError::config_with_source(
                format!("Failed to create config directory {}", self.dir.display()),
                e,
            )
        })?;

        let path = self.path_of(name);
        let json = serde_json::to_string_pretty(config)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&path)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
        }

        #[cfg(not(unix))]
        {
            let mut file = fs::File::create(&path)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
        }

        tracing::info!(environment = name, path = %path.display(), "Environment saved");
        Ok(path)
    }

    /// Names of all environments, sorted, without the `.json` suffix.
    pub fn list(&self) -> Result<Vec<String>, PgToolsError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else { continue };
            if let Some(name) = file_name.strip_suffix(EXTENSION) {
                if entry.file_type()?.is_file() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete environment `name`.
    pub fn remove(&self, name: &str) -> Result<(), PgToolsError> {
        let path = self.path_of(name);
        fs::remove_file(&path).map_err(|e| {
            PgToolsError::config_with_source(
                format!("Cannot remove environment file {}", path.display()),
                e,
            )
        })?;
        tracing::info!(environment = name, "Environment removed");
        Ok(())
    }
}
