//! Whole-store export and import.
//!
//! A [`Snapshot`] is serialized as one flat JSON object holding one array per
//! collection plus an `exportTime` RFC 3339 timestamp:
//!
//! ```json
//! { "employees": [{ "id": 1, "number": "001" }], "exportTime": "2024-03-01T08:00:00Z" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};

use roster_core::{CollectionDef, Record};

use crate::error::StoreError;
use crate::memory::StoredCollection;
use crate::traits::RecordStore;

const EXPORT_TIME: &str = "exportTime";

/// The content of every collection at one logical instant.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Snapshot {
    /// When the snapshot was taken, if recorded.
    pub export_time: Option<String>,
    /// Records per collection, in primary key order.
    pub collections: BTreeMap<String, Vec<Record>>,
}

impl Snapshot {
    /// An empty snapshot without a timestamp.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the records of one collection.
    pub fn with_collection(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.collections.insert(name.into(), records);
        self
    }

    /// Records held for `name`, if the snapshot covers it.
    pub fn collection(&self, name: &str) -> Option<&[Record]> {
        self.collections.get(name).map(Vec::as_slice)
    }

    /// Total number of records across all collections.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    pub fn to_json_pretty(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<Snapshot, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the snapshot as pretty-printed JSON.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn read_from_path(path: impl AsRef<Path>) -> Result<Snapshot, StoreError> {
        let json = std::fs::read_to_string(path)?;
        Snapshot::from_json_str(&json)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.collections.len() + usize::from(self.export_time.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (name, records) in &self.collections {
            map.serialize_entry(name, records)?;
        }
        if let Some(export_time) = &self.export_time {
            map.serialize_entry(EXPORT_TIME, export_time)?;
        }
        map.end()
    }
}

impl TryFrom<Map<String, Value>> for Snapshot {
    type Error = StoreError;

    /// Members other than arrays (and `exportTime`) are skipped.
    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut snapshot = Snapshot::new();
        for (name, value) in map {
            if name == EXPORT_TIME {
                snapshot.export_time = value.as_str().map(str::to_string);
                continue;
            }
            let Value::Array(items) = value else {
                continue;
            };
            let records = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    Record::try_from(item).map_err(|e| {
                        StoreError::InvalidSnapshot(format!("'{name}'[{i}]: {e}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            snapshot.collections.insert(name, records);
        }
        Ok(snapshot)
    }
}

/// File name for a snapshot exported on `date`.
pub fn default_file_name(date: Date) -> String {
    format!(
        "schedule_data_{:04}-{:02}-{:02}.json",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Reads every collection of `store` into a timestamped snapshot.
pub fn export_all(store: &dyn RecordStore) -> Result<Snapshot, StoreError> {
    let mut snapshot = Snapshot::new();
    for name in store.collection_names()? {
        let records = store.get_all(&name)?;
        snapshot.collections.insert(name, records);
    }
    snapshot.export_time = OffsetDateTime::now_utc().format(&Rfc3339).ok();
    tracing::info!(
        collections = snapshot.collections.len(),
        records = snapshot.record_count(),
        "exported snapshot"
    );
    Ok(snapshot)
}

/// Replaces every collection named in `snapshot` with its records.
///
/// All collections are validated before any is touched: each must exist, and
/// its records must load cleanly into an empty copy of it whose key generator
/// continues from the live one, so validation assigns the same keys the
/// import will. Collections the snapshot does not name are left alone.
pub fn import_all(store: &mut dyn RecordStore, snapshot: Snapshot) -> Result<(), StoreError> {
    let mut defs = Vec::with_capacity(snapshot.collections.len());
    for (name, records) in &snapshot.collections {
        let def = store
            .collection_def(name)?
            .ok_or_else(|| StoreError::CollectionNotFound(name.clone()))?;
        let mut scratch = StoredCollection::continuing_from(&def, store.next_key(name)?);
        for record in records {
            if let Err(e) = scratch.put(record.clone()) {
                return Err(rejected(name, record.clone(), e));
            }
        }
        defs.push(def);
    }

    let collections = snapshot.collections.len();
    let mut imported = 0;
    for ((name, records), def) in snapshot.collections.into_iter().zip(&defs) {
        let attempted = records.clone();
        match store.replace_all(&name, records) {
            Ok(keys) => imported += keys.len(),
            Err(
                e @ (StoreError::UniqueConstraintViolation { .. } | StoreError::InvalidKey { .. }),
            ) => {
                let record = offending_record(def, attempted, &e);
                return Err(rejected(&name, record, e));
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!(collections, records = imported, "imported snapshot");
    Ok(())
}

fn rejected(collection: &str, record: Record, cause: StoreError) -> StoreError {
    tracing::warn!(collection, error = %cause, "import rejected");
    StoreError::ImportRejected {
        collection: collection.to_string(),
        record: Box::new(record),
        reason: cause.to_string(),
    }
}

/// The record a write error most likely refers to: the last one holding the
/// colliding index key, or else the first record of the batch.
fn offending_record(def: &CollectionDef, records: Vec<Record>, err: &StoreError) -> Record {
    let colliding = match err {
        StoreError::UniqueConstraintViolation { index, key, .. } => {
            def.index(index).and_then(|index| {
                records
                    .iter()
                    .rposition(|r| index.key_for(r).is_some_and(|k| k.as_str() == key))
            })
        }
        _ => None,
    };
    let position = colliding.unwrap_or(0);
    records.into_iter().nth(position).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::types::SchemaReport;
    use roster_core::catalog::{EMPLOYEES, IDENTIFIERS, SHIFTS};
    use roster_core::{scheduling_schema, RecordKey, SchemaDef};
    use serde_json::json;
    use time::macros::date;

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.ensure_schema(&scheduling_schema()).unwrap();
        store
    }

    #[test]
    fn serializes_flat_with_export_time() {
        let snapshot = Snapshot {
            export_time: Some("2024-03-01T08:00:00Z".to_string()),
            ..Snapshot::new().with_collection(SHIFTS, vec![record(json!({"id": 1, "code": "D"}))])
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            json!({"shifts": [{"id": 1, "code": "D"}], "exportTime": "2024-03-01T08:00:00Z"})
        );
    }

    #[test]
    fn parsing_skips_non_array_members() {
        let snapshot = Snapshot::from_json_str(
            r#"{"exportTime": "2024-03-01T08:00:00Z", "version": 5, "shifts": [{"code": "N"}]}"#,
        )
        .unwrap();
        assert_eq!(snapshot.export_time.as_deref(), Some("2024-03-01T08:00:00Z"));
        assert_eq!(snapshot.collections.len(), 1);
        assert_eq!(snapshot.collection(SHIFTS).unwrap().len(), 1);
    }

    #[test]
    fn parsing_rejects_non_object_records() {
        let err = Snapshot::from_json_str(r#"{"shifts": [1]}"#).unwrap_err();
        assert!(err.to_string().contains("shifts"), "{err}");
    }

    #[test]
    fn file_name_uses_export_date() {
        assert_eq!(default_file_name(date!(2024 - 03 - 01)), "schedule_data_2024-03-01.json");
    }

    #[test]
    fn export_covers_every_collection() {
        let mut store = store();
        store.put(SHIFTS, record(json!({"code": "D"}))).unwrap();
        let snapshot = export_all(&store).unwrap();
        assert_eq!(snapshot.collections.len(), scheduling_schema().collections.len());
        assert_eq!(snapshot.collection(SHIFTS).unwrap().len(), 1);
        assert!(snapshot.collection(EMPLOYEES).unwrap().is_empty());
        assert!(snapshot.export_time.is_some());
    }

    #[test]
    fn import_replaces_named_collections_only() {
        let mut store = store();
        store.put(SHIFTS, record(json!({"code": "old"}))).unwrap();
        store.put(EMPLOYEES, record(json!({"number": "001"}))).unwrap();

        let snapshot = Snapshot::new().with_collection(
            SHIFTS,
            vec![record(json!({"id": 4, "code": "D"})), record(json!({"id": 5, "code": "N"}))],
        );
        import_all(&mut store, snapshot).unwrap();

        let codes: Vec<_> = store
            .get_all(SHIFTS)
            .unwrap()
            .iter()
            .map(|r| r.get("code").cloned())
            .collect();
        assert_eq!(codes, vec![Some(json!("D")), Some(json!("N"))]);
        assert_eq!(store.count(EMPLOYEES).unwrap(), 1);
    }

    #[test]
    fn rejected_import_changes_nothing() {
        let mut store = store();
        store.put(SHIFTS, record(json!({"code": "keep"}))).unwrap();
        store
            .put(IDENTIFIERS, record(json!({"employeeId": 1, "shiftId": 1})))
            .unwrap();

        let bad = record(json!({"id": 2, "employeeId": 1, "shiftId": 2}));
        let snapshot = Snapshot::new()
            .with_collection(SHIFTS, vec![record(json!({"code": "new"}))])
            .with_collection(
                IDENTIFIERS,
                vec![record(json!({"id": 1, "employeeId": 1, "shiftId": 2})), bad.clone()],
            );

        match import_all(&mut store, snapshot).unwrap_err() {
            StoreError::ImportRejected {
                collection, record, ..
            } => {
                assert_eq!(collection, IDENTIFIERS);
                assert_eq!(*record, bad);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            store.get_all(SHIFTS).unwrap()[0].get("code"),
            Some(&json!("keep"))
        );
        assert_eq!(store.count(IDENTIFIERS).unwrap(), 1);
    }

    #[test]
    fn unknown_collection_is_rejected_before_applying() {
        let mut store = store();
        let snapshot = Snapshot::new()
            .with_collection(SHIFTS, vec![record(json!({"code": "D"}))])
            .with_collection("vacations", vec![]);
        assert!(matches!(
            import_all(&mut store, snapshot),
            Err(StoreError::CollectionNotFound(name)) if name == "vacations"
        ));
        assert_eq!(store.count(SHIFTS).unwrap(), 0);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(default_file_name(date!(2024 - 03 - 01)));
        let snapshot = Snapshot::new()
            .with_collection(SHIFTS, vec![record(json!({"id": 1, "code": "D"}))]);
        snapshot.write_to_path(&path).unwrap();
        assert_eq!(Snapshot::read_from_path(&path).unwrap(), snapshot);
    }

    #[test]
    fn validation_follows_the_live_key_generator() {
        let mut store = store();
        for code in ["A", "B", "C", "D"] {
            store.put(SHIFTS, record(json!({"code": code}))).unwrap();
        }
        store.put(EMPLOYEES, record(json!({"number": "keep"}))).unwrap();

        // The keyless record gets key 5, so the explicit key 1 is a second
        // record holding code "X".
        let colliding = record(json!({"id": 1, "code": "X"}));
        let snapshot = Snapshot::new()
            .with_collection(EMPLOYEES, vec![record(json!({"number": "new"}))])
            .with_collection(SHIFTS, vec![record(json!({"code": "X"})), colliding.clone()]);

        match import_all(&mut store, snapshot).unwrap_err() {
            StoreError::ImportRejected {
                collection, record, ..
            } => {
                assert_eq!(collection, SHIFTS);
                assert_eq!(*record, colliding);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            store.get_all(EMPLOYEES).unwrap()[0].get("number"),
            Some(&json!("keep"))
        );
        assert_eq!(store.count(SHIFTS).unwrap(), 4);
    }

    #[test]
    fn imported_keyless_records_continue_the_generator() {
        let mut store = store();
        for code in ["A", "B"] {
            store.put(SHIFTS, record(json!({"code": code}))).unwrap();
        }
        let snapshot = Snapshot::new().with_collection(SHIFTS, vec![record(json!({"code": "N"}))]);
        import_all(&mut store, snapshot).unwrap();
        assert_eq!(store.get_all(SHIFTS).unwrap()[0].get("id"), Some(&json!(3)));
        assert_eq!(store.next_key(SHIFTS).unwrap(), Some(RecordKey(4)));
    }

    /// Delegates to an in-memory store but fails `replace_all` on one
    /// collection with a unique violation.
    struct RejectingStore {
        inner: InMemoryStore,
        reject: &'static str,
    }

    impl RecordStore for RejectingStore {
        fn ensure_schema(&mut self, schema: &SchemaDef) -> Result<SchemaReport, StoreError> {
            self.inner.ensure_schema(schema)
        }
        fn schema_version(&self) -> Result<Option<u32>, StoreError> {
            self.inner.schema_version()
        }
        fn ensure_collection(&mut self, def: &CollectionDef) -> Result<bool, StoreError> {
            self.inner.ensure_collection(def)
        }
        fn has_collection(&self, collection: &str) -> Result<bool, StoreError> {
            self.inner.has_collection(collection)
        }
        fn collection_names(&self) -> Result<Vec<String>, StoreError> {
            self.inner.collection_names()
        }
        fn collection_def(&self, collection: &str) -> Result<Option<CollectionDef>, StoreError> {
            self.inner.collection_def(collection)
        }
        fn next_key(&self, collection: &str) -> Result<Option<RecordKey>, StoreError> {
            self.inner.next_key(collection)
        }
        fn put(&mut self, collection: &str, record: Record) -> Result<RecordKey, StoreError> {
            self.inner.put(collection, record)
        }
        fn put_many(
            &mut self,
            collection: &str,
            records: Vec<Record>,
        ) -> Result<Vec<RecordKey>, StoreError> {
            self.inner.put_many(collection, records)
        }
        fn delete(&mut self, collection: &str, key: RecordKey) -> Result<(), StoreError> {
            self.inner.delete(collection, key)
        }
        fn delete_many(&mut self, collection: &str, keys: &[RecordKey]) -> Result<(), StoreError> {
            self.inner.delete_many(collection, keys)
        }
        fn clear(&mut self, collection: &str) -> Result<(), StoreError> {
            self.inner.clear(collection)
        }
        fn replace_all(
            &mut self,
            collection: &str,
            records: Vec<Record>,
        ) -> Result<Vec<RecordKey>, StoreError> {
            if collection == self.reject {
                return Err(StoreError::UniqueConstraintViolation {
                    collection: collection.to_string(),
                    index: "code".to_string(),
                    key: "\"N\"".to_string(),
                    existing: RecordKey(99),
                });
            }
            self.inner.replace_all(collection, records)
        }
        fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
            self.inner.get_all(collection)
        }
        fn get(&self, collection: &str, key: RecordKey) -> Result<Option<Record>, StoreError> {
            self.inner.get(collection, key)
        }
        fn get_by_index(
            &self,
            collection: &str,
            index: &str,
            value: &Value,
        ) -> Result<Vec<Record>, StoreError> {
            self.inner.get_by_index(collection, index, value)
        }
        fn count(&self, collection: &str) -> Result<usize, StoreError> {
            self.inner.count(collection)
        }
    }

    #[test]
    fn constraint_errors_while_applying_are_import_rejections() {
        let mut store = RejectingStore {
            inner: store(),
            reject: SHIFTS,
        };
        let night = record(json!({"code": "N", "name": "Night"}));
        let snapshot = Snapshot::new().with_collection(
            SHIFTS,
            vec![record(json!({"code": "D", "name": "Day"})), night.clone()],
        );
        match import_all(&mut store, snapshot).unwrap_err() {
            StoreError::ImportRejected {
                collection,
                record,
                reason,
            } => {
                assert_eq!(collection, SHIFTS);
                assert_eq!(*record, night);
                assert!(reason.contains("unique"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
