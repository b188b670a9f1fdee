//! Data model for the roster record store.
//!
//! Everything here is pure data with no I/O: record keys, records, key
//! paths and the canonical index-key encoding, collection/index/schema
//! definitions, and the fixed scheduling catalog. The storage engine lives
//! in `roster-store`.
//!
//! # Modules
//!
//! - [`error`]: CoreError enum for validation failures
//! - [`key`]: RecordKey primary key newtype
//! - [`record`]: Record, a JSON field map
//! - [`keypath`]: KeyPath and IndexKey
//! - [`schema`]: IndexDef, CollectionDef, SchemaDef
//! - [`catalog`]: the scheduling collections

pub mod catalog;
pub mod error;
pub mod key;
pub mod keypath;
pub mod record;
pub mod schema;

// Re-export commonly used types
pub use catalog::{scheduling_schema, shift_orders_collection, SCHEDULING_SCHEMA_VERSION};
pub use error::CoreError;
pub use key::RecordKey;
pub use keypath::{IndexKey, KeyPath};
pub use record::Record;
pub use schema::{CollectionDef, IndexDef, SchemaDef};
