//! Indexed record storage for the roster scheduling application.
//!
//! Provides the [`RecordStore`] trait defining the storage contract that all
//! backends implement, the [`InMemoryStore`] and [`SqliteStore`] backends,
//! and the async [`Store`] handle the application passes around.
//!
//! # Architecture
//!
//! - **Backends** are synchronous. Every write is one atomic unit: a record
//!   (or a whole batch) and all of its index entries land together or not
//!   at all.
//! - **[`Store`]** serializes access to one backend behind an async mutex and
//!   owns the `open -> close` lifecycle.
//! - **Snapshots** export and import whole stores as flat JSON.
//!
//! # Modules
//!
//! - [`error`]: StoreError enum with all failure modes
//! - [`types`]: KeyFailure, SchemaReport storage-layer types
//! - [`traits`]: RecordStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL migrations and connection setup
//! - [`sqlite`]: SqliteStore implementation
//! - [`snapshot`]: Snapshot export/import
//! - [`config`]: StoreConfig backend selection
//! - [`handle`]: async Store handle
//! - [`scheduling`]: typed lookups over the scheduling catalog

pub mod config;
pub mod error;
pub mod handle;
mod keygen;
pub mod memory;
mod reconcile;
pub mod scheduling;
pub mod schema;
pub mod snapshot;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use config::{BackendConfig, StoreConfig};
pub use error::StoreError;
pub use handle::Store;
pub use memory::InMemoryStore;
pub use snapshot::{default_file_name, export_all, import_all, Snapshot};
pub use sqlite::SqliteStore;
pub use traits::RecordStore;
pub use types::{KeyFailure, SchemaReport};

pub use roster_core::{
    catalog, scheduling_schema, shift_orders_collection, CollectionDef, IndexDef, IndexKey,
    KeyPath, Record, RecordKey, SchemaDef, SCHEDULING_SCHEMA_VERSION,
};
