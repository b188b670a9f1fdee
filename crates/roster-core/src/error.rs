//! Core error types for roster-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! validation failures of the data model: malformed keys, non-object
//! records, and invalid schema definitions.

use thiserror::Error;

/// Core errors produced by the roster-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A value could not be used as a record key.
    #[error("invalid record key: {reason}")]
    InvalidKey { reason: String },

    /// A record must be a JSON object.
    #[error("record must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    /// A key path is empty or contains an empty segment.
    #[error("invalid key path '{path}': {reason}")]
    InvalidKeyPath { path: String, reason: String },

    /// A collection or index name is empty.
    #[error("empty {what} name")]
    EmptyName { what: &'static str },

    /// Two indexes of one collection share a name.
    #[error("duplicate index '{index}' in collection '{collection}'")]
    DuplicateIndex { collection: String, index: String },

    /// Two collections of one schema share a name.
    #[error("duplicate collection '{collection}'")]
    DuplicateCollection { collection: String },

    /// Schema versions start at 1.
    #[error("schema version must be at least 1, got {version}")]
    InvalidSchemaVersion { version: u32 },
}
