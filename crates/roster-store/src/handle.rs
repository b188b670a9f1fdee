//! Async store handle shared by the application.
//!
//! [`Store`] wraps a backend in `Arc<tokio::sync::Mutex<>>` so clones can be
//! handed to every component that needs data access. Uses
//! `tokio::sync::Mutex` so callers await the lock without blocking the
//! runtime; `RwLock` is not an option because `rusqlite::Connection` is
//! `!Sync`.
//!
//! Each operation takes the lock and then calls the backend synchronously,
//! with no await point in between. A caller that stops polling after the
//! lock is acquired cannot interrupt a write halfway.

use std::sync::Arc;

use roster_core::{CollectionDef, Record, RecordKey, SchemaDef};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::snapshot::{self, Snapshot};
use crate::traits::RecordStore;
use crate::types::SchemaReport;

type Backend = Box<dyn RecordStore + Send>;

/// An open store. Cloning shares the same backend.
///
/// Lifecycle is `open -> close`; after [`Store::close`] every operation on
/// every clone fails with [`StoreError::StoreClosed`].
#[derive(Clone)]
pub struct Store {
    backend: Arc<Mutex<Option<Backend>>>,
    location: Arc<str>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

fn trace_write<T>(op: &'static str, collection: &str, result: &Result<T, StoreError>) {
    match result {
        Ok(_) => tracing::debug!(op, collection, "write applied"),
        Err(e) if e.is_constraint_violation() => {
            tracing::warn!(op, collection, error = %e, "write rejected")
        }
        Err(e) => tracing::debug!(op, collection, error = %e, "write failed"),
    }
}

impl Store {
    /// Opens the configured backend and brings its schema up to `schema`.
    pub async fn open(config: &StoreConfig, schema: &SchemaDef) -> Result<Store, StoreError> {
        let backend = config.open_backend()?;
        Store::from_backend(backend, config.location(), schema)
    }

    /// Wraps an already opened backend, running `ensure_schema` once.
    pub fn from_backend(
        mut backend: Backend,
        location: &str,
        schema: &SchemaDef,
    ) -> Result<Store, StoreError> {
        let report = backend.ensure_schema(schema)?;
        tracing::info!(
            location,
            version = report.version,
            previous_version = ?report.previous_version,
            created_collections = report.created_collections.len(),
            created_indexes = report.created_indexes.len(),
            "store opened"
        );
        Ok(Store {
            backend: Arc::new(Mutex::new(Some(backend))),
            location: Arc::from(location),
        })
    }

    /// Where the data lives (a file path, or `:memory:`).
    pub fn location(&self) -> &str {
        &self.location
    }

    async fn with<T>(
        &self,
        f: impl FnOnce(&mut (dyn RecordStore + Send)) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.backend.lock().await;
        let backend = guard.as_deref_mut().ok_or(StoreError::StoreClosed)?;
        f(backend)
    }

    // -------------------------------------------------------------------
    // Schema
    // -------------------------------------------------------------------

    /// Creates whatever `schema` declares that does not exist yet.
    pub async fn ensure_schema(&self, schema: &SchemaDef) -> Result<SchemaReport, StoreError> {
        self.with(|s| s.ensure_schema(schema)).await
    }

    /// The persisted schema version, or `None` for a fresh medium.
    pub async fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        self.with(|s| s.schema_version()).await
    }

    /// Creates a collection outside the declared schema; a no-op if it
    /// already exists. Returns whether it was created.
    pub async fn ensure_collection(&self, def: &CollectionDef) -> Result<bool, StoreError> {
        self.with(|s| s.ensure_collection(def)).await
    }

    /// Whether `collection` exists.
    pub async fn has_collection(&self, collection: &str) -> Result<bool, StoreError> {
        self.with(|s| s.has_collection(collection)).await
    }

    /// Every collection name, in creation order.
    pub async fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        self.with(|s| s.collection_names()).await
    }

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    /// Inserts or replaces one record, returning its primary key.
    pub async fn put(&self, collection: &str, record: Record) -> Result<RecordKey, StoreError> {
        let result = self.with(|s| s.put(collection, record)).await;
        trace_write("put", collection, &result);
        result
    }

    /// Writes a batch atomically: every record lands or none does.
    pub async fn put_many(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<RecordKey>, StoreError> {
        let result = self.with(|s| s.put_many(collection, records)).await;
        trace_write("put_many", collection, &result);
        result
    }

    /// Removes a record and its index entries. Missing keys are not an error.
    pub async fn delete(&self, collection: &str, key: RecordKey) -> Result<(), StoreError> {
        let result = self.with(|s| s.delete(collection, key)).await;
        trace_write("delete", collection, &result);
        result
    }

    /// Removes several records in one unit; see [`RecordStore::delete_many`].
    pub async fn delete_many(&self, collection: &str, keys: &[RecordKey]) -> Result<(), StoreError> {
        let result = self.with(|s| s.delete_many(collection, keys)).await;
        trace_write("delete_many", collection, &result);
        result
    }

    /// Empties a collection, keeping its definition and indexes.
    pub async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        let result = self.with(|s| s.clear(collection)).await;
        trace_write("clear", collection, &result);
        result
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// All records of a collection, by ascending primary key.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.with(|s| s.get_all(collection)).await
    }

    /// The record with `key`, or `None` if there is none.
    pub async fn get(&self, collection: &str, key: RecordKey) -> Result<Option<Record>, StoreError> {
        self.with(|s| s.get(collection, key)).await
    }

    /// Records whose index key equals `value`. Composite indexes take an
    /// array with one element per component field.
    pub async fn get_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        self.with(|s| s.get_by_index(collection, index, value)).await
    }

    /// Records matching any of `values`, each at most once.
    pub async fn get_many_by_index(
        &self,
        collection: &str,
        index: &str,
        values: &[Value],
    ) -> Result<Vec<Record>, StoreError> {
        self.with(|s| s.get_many_by_index(collection, index, values))
            .await
    }

    /// Number of records in a collection.
    pub async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        self.with(|s| s.count(collection)).await
    }

    // -------------------------------------------------------------------
    // Export / import
    // -------------------------------------------------------------------

    /// Reads every collection into a timestamped snapshot.
    pub async fn export_all(&self) -> Result<Snapshot, StoreError> {
        self.with(|s| snapshot::export_all(&*s)).await
    }

    /// Replaces every collection the snapshot names. See
    /// [`snapshot::import_all`] for the validation rules.
    pub async fn import_all(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.with(|s| snapshot::import_all(s, snapshot)).await
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Releases the backend. Closing twice is a no-op.
    pub async fn close(&self) {
        if self.backend.lock().await.take().is_some() {
            tracing::info!(location = %self.location, "store closed");
        }
    }

    /// Whether [`Store::close`] has run.
    pub async fn is_closed(&self) -> bool {
        self.backend.lock().await.is_none()
    }
}
