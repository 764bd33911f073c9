//! Runtime configuration.
//!
//! Resolved once at process startup and passed into the wiring code, so
//! request handling never reads process-wide environment variables.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::db::validate_table_name;

/// Selects the storage backend.
pub const BACKEND_ENV: &str = "PATIENT_STORE_BACKEND";
/// SQLite database file, required for the `sqlite` backend.
pub const PATH_ENV: &str = "PATIENT_STORE_PATH";
/// Name of the durable patient table.
pub const TABLE_ENV: &str = "PATIENT_TABLE_NAME";

pub const DEFAULT_TABLE_NAME: &str = "patients";

/// Configuration errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown storage backend {0:?} (expected \"memory\" or \"sqlite\")")]
    UnknownBackend(String),

    #[error("PATIENT_STORE_PATH is required for the sqlite backend")]
    MissingPath,

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),
}

/// Which [`PatientStore`](crate::store::PatientStore) implementation to wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite { path: PathBuf },
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite { .. } => "sqlite",
        }
    }
}

/// Configuration resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    backend: StoreBackend,
    table_name: String,
}

impl AppConfig {
    pub fn new(backend: StoreBackend, table_name: impl Into<String>) -> Result<Self, ConfigError> {
        let table_name = table_name.into();
        if validate_table_name(&table_name).is_err() {
            return Err(ConfigError::InvalidTableName(table_name));
        }
        Ok(Self {
            backend,
            table_name,
        })
    }

    /// In-memory backend with default settings.
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }

    /// SQLite backend at `path` using the default table.
    pub fn sqlite<P: AsRef<Path>>(path: P) -> Self {
        Self {
            backend: StoreBackend::Sqlite {
                path: path.as_ref().to_path_buf(),
            },
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }

    /// Read the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is normal
        let _ = dotenvy::dotenv();

        Self::from_env_values(
            std::env::var(BACKEND_ENV).ok(),
            std::env::var(PATH_ENV).ok(),
            std::env::var(TABLE_ENV).ok(),
        )
    }

    /// Build from raw variable values. Empty or whitespace values count as
    /// unset.
    pub fn from_env_values(
        backend: Option<String>,
        path: Option<String>,
        table_name: Option<String>,
    ) -> Result<Self, ConfigError> {
        let backend = non_blank(backend).map(|b| b.to_ascii_lowercase());
        let path = non_blank(path);
        let table_name = non_blank(table_name).unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());

        let backend = match backend.as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("sqlite") => StoreBackend::Sqlite {
                path: path.map(PathBuf::from).ok_or(ConfigError::MissingPath)?,
            },
            Some(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        Self::new(backend, table_name)
    }

    pub fn backend(&self) -> &StoreBackend {
        &self.backend
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
