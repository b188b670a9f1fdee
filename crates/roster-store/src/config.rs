//! Store configuration.
//!
//! Reads from environment variables when built with [`StoreConfig::from_env`]:
//! - `ROSTER_DB_PATH`: SQLite database file path (default: "roster.db").
//!   The value `:memory:` selects the in-memory backend.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::memory::InMemoryStore;
use crate::sqlite::SqliteStore;
use crate::traits::RecordStore;

/// Environment variable naming the database path.
pub const DB_PATH_VAR: &str = "ROSTER_DB_PATH";
/// Database path used when [`DB_PATH_VAR`] is unset.
pub const DEFAULT_DB_PATH: &str = "roster.db";
const MEMORY_PATH: &str = ":memory:";

/// Which backend a [`crate::Store`] opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Records live only as long as the store.
    Memory,
    /// Records persist in a SQLite database file.
    Sqlite { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendConfig,
}

impl StoreConfig {
    pub fn memory() -> Self {
        StoreConfig {
            backend: BackendConfig::Memory,
        }
    }

    pub fn sqlite(path: impl Into<String>) -> Self {
        StoreConfig {
            backend: BackendConfig::Sqlite { path: path.into() },
        }
    }

    /// Builds the configuration from `ROSTER_DB_PATH`.
    pub fn from_env() -> Self {
        Self::from_db_path(std::env::var(DB_PATH_VAR).ok())
    }

    fn from_db_path(path: Option<String>) -> Self {
        match path.as_deref() {
            Some(MEMORY_PATH) => Self::memory(),
            Some(path) if !path.trim().is_empty() => Self::sqlite(path),
            _ => Self::sqlite(DEFAULT_DB_PATH),
        }
    }

    /// Opens the configured backend without touching its schema.
    pub fn open_backend(&self) -> Result<Box<dyn RecordStore + Send>, StoreError> {
        match &self.backend {
            BackendConfig::Memory => Ok(Box::new(InMemoryStore::new())),
            BackendConfig::Sqlite { path } => Ok(Box::new(SqliteStore::new(path)?)),
        }
    }

    /// Short description of where the data lives, for logs.
    pub fn location(&self) -> &str {
        match &self.backend {
            BackendConfig::Memory => MEMORY_PATH,
            BackendConfig::Sqlite { path } => path,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::sqlite(DEFAULT_DB_PATH)
    }
}
