//! Storage error types for roster-store.
//!
//! [`StoreError`] covers every failure mode of the store engine: an
//! unavailable or closed store, constraint violations, rejected imports,
//! unknown collections and indexes, schema mismatches, and the underlying
//! serialization and SQLite errors, which are surfaced verbatim.

use roster_core::{CoreError, Record, RecordKey};
use thiserror::Error;

use crate::types::KeyFailure;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage medium could not be opened.
    #[error("store unavailable at {location}: {reason}")]
    StoreUnavailable { location: String, reason: String },

    /// The handle was closed; a new `open` is required.
    #[error("store is closed")]
    StoreClosed,

    /// A write would give a unique index two records with one key.
    #[error(
        "unique constraint violated: index '{index}' on '{collection}' already maps {key} to record {existing}"
    )]
    UniqueConstraintViolation {
        collection: String,
        index: String,
        key: String,
        existing: RecordKey,
    },

    /// Some keys of a batch delete could not be processed; nothing was deleted.
    #[error("batch delete on '{collection}' failed for {} key(s)", .failed.len())]
    PartialFailure {
        collection: String,
        failed: Vec<KeyFailure>,
    },

    /// An imported record failed validation; the store was not modified.
    #[error("import rejected for '{collection}': {reason}")]
    ImportRejected {
        collection: String,
        record: Box<Record>,
        reason: String,
    },

    /// The named collection does not exist.
    #[error("collection not found: '{0}'")]
    CollectionNotFound(String),

    /// The named index does not exist on the collection.
    #[error("index not found: '{index}' on '{collection}'")]
    IndexNotFound { collection: String, index: String },

    /// A record's primary key is malformed or missing where required.
    #[error("invalid key in '{collection}': {reason}")]
    InvalidKey { collection: String, reason: String },

    /// The declared schema version is older than the persisted one.
    #[error("schema version {requested} is older than persisted version {persisted}")]
    SchemaVersion { persisted: u32, requested: u32 },

    /// A declared definition disagrees with the persisted one.
    #[error("schema conflict on '{collection}': {reason}")]
    SchemaConflict { collection: String, reason: String },

    /// A schema or record definition failed validation.
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] CoreError),

    /// A snapshot document is malformed.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The SQLite backend reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying the internal table migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Reading or writing a snapshot file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error is a unique-index collision.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::UniqueConstraintViolation { .. })
    }

    /// Converts a key error from the data model into a collection-scoped one.
    pub(crate) fn invalid_key(collection: &str, err: CoreError) -> Self {
        match err {
            CoreError::InvalidKey { reason } => StoreError::InvalidKey {
                collection: collection.to_string(),
                reason,
            },
            other => StoreError::InvalidKey {
                collection: collection.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
