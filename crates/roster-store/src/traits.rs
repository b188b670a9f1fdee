//! The [`RecordStore`] trait defining the storage contract for collections.
//!
//! Two-layer API design:
//! - **Schema and CRUD** methods form the trait foundation. Each write call
//!   is one atomic unit: a record and all of its index entries land
//!   together or not at all.
//! - **Convenience** methods (`get_many_by_index`) are provided on top of
//!   the primitives.
//!
//! All backends (InMemoryStore, SqliteStore) implement this trait with the
//! same observable semantics, so they are swappable without changing the
//! callers. The trait is synchronous; the async [`crate::Store`] handle
//! serializes access to it.

use std::collections::HashSet;

use roster_core::{CollectionDef, Record, RecordKey, SchemaDef};
use serde_json::Value;

use crate::error::StoreError;
use crate::types::SchemaReport;

/// The storage contract for schema-defined, indexed record collections.
pub trait RecordStore {
    // -------------------------------------------------------------------
    // Schema
    // -------------------------------------------------------------------

    /// Creates every declared collection and index that does not exist yet.
    ///
    /// Existing data is left untouched. Fails with
    /// [`StoreError::SchemaVersion`] when `schema.version` is older than the
    /// persisted version, and with [`StoreError::SchemaConflict`] when a
    /// declared index disagrees with the persisted one of the same name.
    /// Indexes added to populated collections are backfilled; if existing
    /// records violate a new unique index, nothing is changed.
    fn ensure_schema(&mut self, schema: &SchemaDef) -> Result<SchemaReport, StoreError>;

    /// The persisted schema version, or `None` for a fresh store.
    fn schema_version(&self) -> Result<Option<u32>, StoreError>;

    /// Creates one collection (and its indexes) if missing.
    ///
    /// Returns `true` when the collection was created. Indexes missing from
    /// an existing collection are added as in [`RecordStore::ensure_schema`].
    fn ensure_collection(&mut self, def: &CollectionDef) -> Result<bool, StoreError>;

    /// Whether a collection exists.
    fn has_collection(&self, collection: &str) -> Result<bool, StoreError>;

    /// Names of all collections, in creation order.
    fn collection_names(&self) -> Result<Vec<String>, StoreError>;

    /// The persisted definition of a collection.
    fn collection_def(&self, collection: &str) -> Result<Option<CollectionDef>, StoreError>;

    /// The key the collection's generator hands out next, or `None` once it
    /// is exhausted. `clear` and `replace_all` keep this position.
    fn next_key(&self, collection: &str) -> Result<Option<RecordKey>, StoreError>;

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    /// Inserts or replaces one record, returning its primary key.
    ///
    /// A record without a key gets the next generated key. A record with a
    /// key replaces any record stored under it.
    fn put(&mut self, collection: &str, record: Record) -> Result<RecordKey, StoreError>;

    /// Writes a batch of records as one all-or-nothing transaction.
    fn put_many(
        &mut self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<RecordKey>, StoreError>;

    /// Removes a record and its index entries. Missing keys are not an error.
    fn delete(&mut self, collection: &str, key: RecordKey) -> Result<(), StoreError>;

    /// Removes many records in one transaction.
    ///
    /// If any key cannot be processed the whole batch is rolled back and
    /// [`StoreError::PartialFailure`] lists every failed key.
    fn delete_many(&mut self, collection: &str, keys: &[RecordKey]) -> Result<(), StoreError>;

    /// Removes every record and index entry, keeping the definitions.
    fn clear(&mut self, collection: &str) -> Result<(), StoreError>;

    /// Clears a collection and writes `records` in order, as one unit.
    fn replace_all(
        &mut self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<RecordKey>, StoreError>;

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// All records, ordered by primary key.
    fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    /// The record stored under `key`, or `None`.
    fn get(&self, collection: &str, key: RecordKey) -> Result<Option<Record>, StoreError>;

    /// Records whose index key equals `value`, ordered by primary key.
    ///
    /// For a composite index `value` is the full tuple as a JSON array. A
    /// value that is not a valid key matches nothing.
    fn get_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError>;

    /// Number of records in a collection.
    fn count(&self, collection: &str) -> Result<usize, StoreError>;

    // -------------------------------------------------------------------
    // Convenience
    // -------------------------------------------------------------------

    /// Union of [`RecordStore::get_by_index`] over `values`.
    ///
    /// Results are grouped in request order and each record appears once,
    /// even when it matches several requested values.
    fn get_many_by_index(
        &self,
        collection: &str,
        index: &str,
        values: &[Value],
    ) -> Result<Vec<Record>, StoreError> {
        let key_path = self
            .collection_def(collection)?
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?
            .key_path;

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for value in values {
            for record in self.get_by_index(collection, index, value)? {
                let key = record
                    .key(&key_path)
                    .map_err(|e| StoreError::invalid_key(collection, e))?;
                if key.map_or(true, |k| seen.insert(k)) {
                    result.push(record);
                }
            }
        }
        Ok(result)
    }
}
