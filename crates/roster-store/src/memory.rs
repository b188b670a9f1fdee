//! In-memory implementation of [`RecordStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests, ephemeral sessions,
//! and anywhere persistence isn't needed. It has identical semantics to the
//! SQLite backend. [`StoredCollection`] is also used as a scratch copy when
//! validating snapshot imports.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde_json::Value;

use roster_core::{CollectionDef, IndexDef, IndexKey, Record, RecordKey, SchemaDef};

use crate::error::StoreError;
use crate::keygen::{assign_key, KeyGenerator};
use crate::reconcile::{check_version, missing_indexes};
use crate::traits::RecordStore;
use crate::types::SchemaReport;

/// One secondary index: index key -> primary keys of matching records.
#[derive(Debug, Clone)]
struct StoredIndex {
    def: IndexDef,
    entries: BTreeMap<IndexKey, BTreeSet<RecordKey>>,
}

impl StoredIndex {
    fn new(def: IndexDef) -> Self {
        StoredIndex {
            def,
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, index_key: IndexKey, key: RecordKey) {
        self.entries.entry(index_key).or_default().insert(key);
    }

    fn remove(&mut self, record: &Record, key: RecordKey) {
        let Some(index_key) = self.def.key_for(record) else {
            return;
        };
        if let Some(keys) = self.entries.get_mut(&index_key) {
            keys.remove(&key);
            if keys.is_empty() {
                self.entries.remove(&index_key);
            }
        }
    }

    /// A record other than `key` already holding `index_key`, if any.
    fn holder_other_than(&self, index_key: &IndexKey, key: RecordKey) -> Option<RecordKey> {
        self.entries
            .get(index_key)
            .and_then(|keys| keys.iter().copied().find(|k| *k != key))
    }
}

/// Data stored for a single collection.
#[derive(Debug, Clone)]
pub(crate) struct StoredCollection {
    def: CollectionDef,
    /// Records indexed by primary key
    records: BTreeMap<RecordKey, Record>,
    /// Secondary indexes in declaration order
    indexes: IndexMap<String, StoredIndex>,
    /// Next generated primary key
    next_key: KeyGenerator,
}

impl StoredCollection {
    /// An empty collection with the indexes of `def`.
    pub(crate) fn new(def: &CollectionDef) -> Self {
        StoredCollection {
            def: def.clone(),
            records: BTreeMap::new(),
            indexes: def
                .indexes
                .iter()
                .map(|index| (index.name.clone(), StoredIndex::new(index.clone())))
                .collect(),
            next_key: Some(RecordKey::FIRST),
        }
    }

    /// An empty collection whose key generator continues from `next_key`.
    pub(crate) fn continuing_from(def: &CollectionDef, next_key: KeyGenerator) -> Self {
        StoredCollection {
            next_key,
            ..StoredCollection::new(def)
        }
    }

    pub(crate) fn next_key(&self) -> KeyGenerator {
        self.next_key
    }

    pub(crate) fn def(&self) -> &CollectionDef {
        &self.def
    }

    /// Inserts or replaces one record. Nothing changes on failure.
    pub(crate) fn put(&mut self, mut record: Record) -> Result<RecordKey, StoreError> {
        let mut next_key = self.next_key;
        let key = assign_key(&self.def, &mut next_key, &mut record)?;

        let index_keys: Vec<Option<IndexKey>> = self
            .indexes
            .values()
            .map(|index| index.def.key_for(&record))
            .collect();

        for (index, index_key) in self.indexes.values().zip(&index_keys) {
            let Some(index_key) = index_key else { continue };
            if !index.def.unique {
                continue;
            }
            if let Some(existing) = index.holder_other_than(index_key, key) {
                return Err(StoreError::UniqueConstraintViolation {
                    collection: self.def.name.clone(),
                    index: index.def.name.clone(),
                    key: index_key.to_string(),
                    existing,
                });
            }
        }

        if let Some(previous) = self.records.remove(&key) {
            for index in self.indexes.values_mut() {
                index.remove(&previous, key);
            }
        }
        for (index, index_key) in self.indexes.values_mut().zip(index_keys) {
            if let Some(index_key) = index_key {
                index.insert(index_key, key);
            }
        }
        self.records.insert(key, record);
        self.next_key = next_key;
        Ok(key)
    }

    /// Applies a batch on a staged copy, swapping it in only on success.
    pub(crate) fn put_many(&mut self, records: Vec<Record>) -> Result<Vec<RecordKey>, StoreError> {
        let mut staged = self.clone();
        let keys = records
            .into_iter()
            .map(|record| staged.put(record))
            .collect::<Result<Vec<_>, _>>()?;
        *self = staged;
        Ok(keys)
    }

    pub(crate) fn delete(&mut self, key: RecordKey) -> bool {
        match self.records.remove(&key) {
            Some(previous) => {
                for index in self.indexes.values_mut() {
                    index.remove(&previous, key);
                }
                true
            }
            None => false,
        }
    }

    /// Drops every record and index entry. The key generator keeps its place.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }

    /// Builds a new index over the current records and attaches it.
    fn add_index(&mut self, def: IndexDef) -> Result<(), StoreError> {
        let mut index = StoredIndex::new(def);
        for (&key, record) in &self.records {
            let Some(index_key) = index.def.key_for(record) else {
                continue;
            };
            if index.def.unique {
                if let Some(existing) = index.holder_other_than(&index_key, key) {
                    return Err(StoreError::UniqueConstraintViolation {
                        collection: self.def.name.clone(),
                        index: index.def.name.clone(),
                        key: index_key.to_string(),
                        existing,
                    });
                }
            }
            index.insert(index_key, key);
        }
        self.def.indexes.push(index.def.clone());
        self.indexes.insert(index.def.name.clone(), index);
        Ok(())
    }

    pub(crate) fn get(&self, key: RecordKey) -> Option<&Record> {
        self.records.get(&key)
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn get_by_index(&self, index: &str, value: &Value) -> Result<Vec<Record>, StoreError> {
        let index = self
            .indexes
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound {
                collection: self.def.name.clone(),
                index: index.to_string(),
            })?;
        let Some(index_key) = index.def.query_key(value) else {
            return Ok(Vec::new());
        };
        Ok(index
            .entries
            .get(&index_key)
            .into_iter()
            .flatten()
            .filter_map(|key| self.records.get(key).cloned())
            .collect())
    }
}

/// Creates `def` in `collections` or extends the existing collection.
///
/// Returns the names of indexes added to an existing collection, or `None`
/// when the collection itself was created.
fn ensure_in(
    collections: &mut IndexMap<String, StoredCollection>,
    def: &CollectionDef,
) -> Result<Option<Vec<String>>, StoreError> {
    def.validate()?;
    match collections.get_mut(&def.name) {
        Some(existing) => {
            let missing = missing_indexes(existing.def(), def)?;
            let mut added = Vec::with_capacity(missing.len());
            for index in missing {
                added.push(index.name.clone());
                existing.add_index(index)?;
            }
            Ok(Some(added))
        }
        None => {
            collections.insert(def.name.clone(), StoredCollection::new(def));
            Ok(None)
        }
    }
}

/// In-memory implementation of [`RecordStore`].
///
/// Production-quality backend for tests, ephemeral sessions, and anywhere
/// persistence isn't needed. Collections keep their creation order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: IndexMap<String, StoredCollection>,
    schema_version: Option<u32>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> Result<&StoredCollection, StoreError> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut StoredCollection, StoreError> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }
}

impl RecordStore for InMemoryStore {
    // -------------------------------------------------------------------
    // Schema
    // -------------------------------------------------------------------

    fn ensure_schema(&mut self, schema: &SchemaDef) -> Result<SchemaReport, StoreError> {
        schema.validate()?;
        check_version(self.schema_version, schema.version)?;

        let mut staged = self.collections.clone();
        let mut report = SchemaReport {
            previous_version: self.schema_version,
            version: schema.version,
            ..SchemaReport::default()
        };
        for def in &schema.collections {
            report.note(&def.name, ensure_in(&mut staged, def)?);
        }

        self.collections = staged;
        self.schema_version = Some(schema.version);
        report.log_created();
        Ok(report)
    }

    fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.schema_version)
    }

    fn ensure_collection(&mut self, def: &CollectionDef) -> Result<bool, StoreError> {
        let mut staged = self.collections.clone();
        let added = ensure_in(&mut staged, def)?;
        self.collections = staged;
        let created = added.is_none();
        let mut report = SchemaReport::default();
        report.note(&def.name, added);
        report.log_created();
        Ok(created)
    }

    fn has_collection(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.collections.contains_key(collection))
    }

    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.keys().cloned().collect())
    }

    fn collection_def(&self, collection: &str) -> Result<Option<CollectionDef>, StoreError> {
        Ok(self.collections.get(collection).map(|c| c.def().clone()))
    }

    fn next_key(&self, collection: &str) -> Result<Option<RecordKey>, StoreError> {
        Ok(self.collection(collection)?.next_key())
    }

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    fn put(&mut self, collection: &str, record: Record) -> Result<RecordKey, StoreError> {
        self.collection_mut(collection)?.put(record)
    }

    fn put_many(
        &mut self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<RecordKey>, StoreError> {
        self.collection_mut(collection)?.put_many(records)
    }

    fn delete(&mut self, collection: &str, key: RecordKey) -> Result<(), StoreError> {
        self.collection_mut(collection)?.delete(key);
        Ok(())
    }

    fn delete_many(&mut self, collection: &str, keys: &[RecordKey]) -> Result<(), StoreError> {
        let stored = self.collection_mut(collection)?;
        for &key in keys {
            stored.delete(key);
        }
        Ok(())
    }

    fn clear(&mut self, collection: &str) -> Result<(), StoreError> {
        self.collection_mut(collection)?.clear();
        Ok(())
    }

    fn replace_all(
        &mut self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<RecordKey>, StoreError> {
        let stored = self.collection_mut(collection)?;
        let mut staged = stored.clone();
        staged.clear();
        let keys = staged.put_many(records)?;
        *stored = staged;
        Ok(keys)
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self.collection(collection)?.records().cloned().collect())
    }

    fn get(&self, collection: &str, key: RecordKey) -> Result<Option<Record>, StoreError> {
        Ok(self.collection(collection)?.get(key).cloned())
    }

    fn get_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        self.collection(collection)?.get_by_index(index, value)
    }

    fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self.collection(collection)?.len())
    }
}
