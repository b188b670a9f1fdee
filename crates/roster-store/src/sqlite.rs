//! SQLite implementation of [`RecordStore`].
//!
//! [`SqliteStore`] persists collections in a SQLite database with WAL mode,
//! one transaction per write operation, and automatic migrations of its
//! internal tables. Records are stored as JSON TEXT via serde_json; index
//! entries are stored as canonical [`IndexKey`] strings so lookups are exact
//! string matches.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use roster_core::{CollectionDef, IndexDef, IndexKey, KeyPath, Record, RecordKey, SchemaDef};

use crate::error::StoreError;
use crate::keygen::{assign_key, KeyGenerator};
use crate::reconcile::{check_version, missing_indexes};
use crate::traits::RecordStore;
use crate::types::{KeyFailure, SchemaReport};

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// SQLite-backed implementation of [`RecordStore`].
///
/// Every write operation is wrapped in a transaction for atomicity: a
/// failed write is rolled back when its transaction is dropped.
pub struct SqliteStore {
    conn: Connection,
}

/// A persisted collection definition plus its key generator position.
///
/// An exhausted generator is stored as a NULL `next_key`.
struct CollectionRow {
    def: CollectionDef,
    next_key: KeyGenerator,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }
}

// -----------------------------------------------------------------------
// Internal helpers
//
// These take a `&Connection` so they work on the connection itself and on
// an open `Transaction` (which derefs to `Connection`).
// -----------------------------------------------------------------------

fn read_version(conn: &Connection) -> Result<Option<u32>, StoreError> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            params![SCHEMA_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;
    value
        .map(|v| {
            v.parse::<u32>()
                .map_err(|e| StoreError::Migration(format!("unreadable schema version '{v}': {e}")))
        })
        .transpose()
}

fn write_version(conn: &Connection, version: u32) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![SCHEMA_VERSION_KEY, version.to_string()],
    )?;
    Ok(())
}

/// Loads a collection definition, or `None` if it does not exist.
fn load_collection(conn: &Connection, name: &str) -> Result<Option<CollectionRow>, StoreError> {
    let row = conn
        .query_row(
            "SELECT key_path, auto_increment, next_key FROM collections WHERE name = ?1",
            params![name],
            |row| {
                let key_path: String = row.get(0)?;
                let auto_increment: i32 = row.get(1)?;
                let next_key: Option<i64> = row.get(2)?;
                Ok((key_path, auto_increment, next_key))
            },
        )
        .optional()?;

    let Some((key_path, auto_increment, next_key)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare_cached(
        "SELECT name, key_path_json, is_unique FROM collection_indexes
         WHERE collection = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![name], |row| {
        let index_name: String = row.get(0)?;
        let key_path_json: String = row.get(1)?;
        let is_unique: i32 = row.get(2)?;
        Ok((index_name, key_path_json, is_unique))
    })?;
    let mut indexes = Vec::new();
    for row in rows {
        let (index_name, key_path_json, is_unique) = row?;
        let key_path: KeyPath = serde_json::from_str(&key_path_json)?;
        indexes.push(IndexDef {
            name: index_name,
            key_path,
            unique: is_unique != 0,
        });
    }

    Ok(Some(CollectionRow {
        def: CollectionDef {
            name: name.to_string(),
            key_path,
            auto_increment: auto_increment != 0,
            indexes,
        },
        next_key: next_key.map(RecordKey),
    }))
}

/// Loads a collection definition, failing if it does not exist.
fn require_collection(conn: &Connection, name: &str) -> Result<CollectionRow, StoreError> {
    load_collection(conn, name)?.ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
}

fn set_next_key(conn: &Connection, name: &str, next_key: KeyGenerator) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE collections SET next_key = ?2 WHERE name = ?1",
        params![name, next_key.map(|key| key.0)],
    )?;
    Ok(())
}

/// A record other than `key` holding `index_key` in a unique index.
fn unique_holder(
    conn: &Connection,
    collection: &str,
    index: &str,
    index_key: &IndexKey,
    key: RecordKey,
) -> Result<Option<RecordKey>, StoreError> {
    let holder: Option<i64> = conn
        .query_row(
            "SELECT record_key FROM index_entries
             WHERE collection = ?1 AND index_name = ?2 AND index_key = ?3 AND record_key != ?4
             LIMIT 1",
            params![collection, index, index_key.as_str(), key.0],
            |row| row.get(0),
        )
        .optional()?;
    Ok(holder.map(RecordKey))
}

fn insert_entry(
    conn: &Connection,
    collection: &str,
    index: &IndexDef,
    index_key: &IndexKey,
    key: RecordKey,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO index_entries (collection, index_name, index_key, record_key, is_unique)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    stmt.execute(params![
        collection,
        index.name,
        index_key.as_str(),
        key.0,
        index.unique as i32,
    ])?;
    Ok(())
}

/// Writes one record and its index entries. The caller owns the transaction
/// and persists `next_key` afterwards.
fn put_record(
    conn: &Connection,
    def: &CollectionDef,
    next_key: &mut KeyGenerator,
    mut record: Record,
) -> Result<RecordKey, StoreError> {
    let key = assign_key(def, next_key, &mut record)?;

    let entries: Vec<(&IndexDef, IndexKey)> = def
        .indexes
        .iter()
        .filter_map(|index| index.key_for(&record).map(|k| (index, k)))
        .collect();

    for (index, index_key) in &entries {
        if !index.unique {
            continue;
        }
        if let Some(existing) = unique_holder(conn, &def.name, &index.name, index_key, key)? {
            return Err(StoreError::UniqueConstraintViolation {
                collection: def.name.clone(),
                index: index.name.clone(),
                key: index_key.to_string(),
                existing,
            });
        }
    }

    conn.execute(
        "DELETE FROM index_entries WHERE collection = ?1 AND record_key = ?2",
        params![def.name, key.0],
    )?;
    let record_json = serde_json::to_string(&record)?;
    {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO records (collection, record_key, record_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, record_key) DO UPDATE SET record_json = excluded.record_json",
        )?;
        stmt.execute(params![def.name, key.0, record_json])?;
    }
    for (index, index_key) in &entries {
        insert_entry(conn, &def.name, index, index_key, key)?;
    }
    Ok(key)
}

fn put_all(
    conn: &Connection,
    row: CollectionRow,
    records: Vec<Record>,
) -> Result<Vec<RecordKey>, StoreError> {
    let CollectionRow { def, mut next_key } = row;
    let keys = records
        .into_iter()
        .map(|record| put_record(conn, &def, &mut next_key, record))
        .collect::<Result<Vec<_>, _>>()?;
    set_next_key(conn, &def.name, next_key)?;
    Ok(keys)
}

fn clear_collection(conn: &Connection, name: &str) -> Result<(), StoreError> {
    // CASCADE handles the entries, but explicit deletes are clearer.
    conn.execute(
        "DELETE FROM index_entries WHERE collection = ?1",
        params![name],
    )?;
    conn.execute("DELETE FROM records WHERE collection = ?1", params![name])?;
    Ok(())
}

/// Registers a new index and backfills it from the stored records.
fn add_index(conn: &Connection, collection: &str, index: &IndexDef) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO collection_indexes (collection, name, position, key_path_json, is_unique)
         VALUES (?1, ?2,
                 (SELECT COALESCE(MAX(position) + 1, 0) FROM collection_indexes WHERE collection = ?1),
                 ?3, ?4)",
        params![
            collection,
            index.name,
            serde_json::to_string(&index.key_path)?,
            index.unique as i32,
        ],
    )?;

    let stored: Vec<(i64, String)> = {
        let mut stmt = conn.prepare_cached(
            "SELECT record_key, record_json FROM records WHERE collection = ?1 ORDER BY record_key",
        )?;
        let rows = stmt.query_map(params![collection], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let stored = rows.collect::<Result<Vec<_>, _>>()?;
        stored
    };

    for (key, record_json) in stored {
        let key = RecordKey(key);
        let record: Record = serde_json::from_str(&record_json)?;
        let Some(index_key) = index.key_for(&record) else {
            continue;
        };
        if index.unique {
            if let Some(existing) = unique_holder(conn, collection, &index.name, &index_key, key)? {
                return Err(StoreError::UniqueConstraintViolation {
                    collection: collection.to_string(),
                    index: index.name.clone(),
                    key: index_key.to_string(),
                    existing,
                });
            }
        }
        insert_entry(conn, collection, index, &index_key, key)?;
    }
    Ok(())
}

/// Creates `def` or extends the existing collection with missing indexes.
///
/// Returns the indexes added to an existing collection, or `None` when the
/// collection itself was created.
fn ensure_in(conn: &Connection, def: &CollectionDef) -> Result<Option<Vec<String>>, StoreError> {
    def.validate()?;
    if let Some(existing) = load_collection(conn, &def.name)? {
        let missing = missing_indexes(&existing.def, def)?;
        let mut added = Vec::with_capacity(missing.len());
        for index in &missing {
            add_index(conn, &def.name, index)?;
            added.push(index.name.clone());
        }
        return Ok(Some(added));
    }

    conn.execute(
        "INSERT INTO collections (name, position, key_path, auto_increment, next_key)
         VALUES (?1, (SELECT COALESCE(MAX(position) + 1, 0) FROM collections), ?2, ?3, ?4)",
        params![
            def.name,
            def.key_path,
            def.auto_increment as i32,
            RecordKey::FIRST.0,
        ],
    )?;
    for index in &def.indexes {
        add_index(conn, &def.name, index)?;
    }
    Ok(None)
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<String>>,
) -> Result<Vec<Record>, StoreError> {
    let mut result = Vec::new();
    for row in rows {
        let record_json = row?;
        result.push(serde_json::from_str(&record_json)?);
    }
    Ok(result)
}

impl RecordStore for SqliteStore {
    // -------------------------------------------------------------------
    // Schema
    // -------------------------------------------------------------------

    fn ensure_schema(&mut self, schema: &SchemaDef) -> Result<SchemaReport, StoreError> {
        schema.validate()?;
        let tx = self.conn.transaction()?;
        let previous_version = read_version(&tx)?;
        check_version(previous_version, schema.version)?;

        let mut report = SchemaReport {
            previous_version,
            version: schema.version,
            ..SchemaReport::default()
        };
        for def in &schema.collections {
            report.note(&def.name, ensure_in(&tx, def)?);
        }
        write_version(&tx, schema.version)?;
        tx.commit()?;
        report.log_created();
        Ok(report)
    }

    fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        read_version(&self.conn)
    }

    fn ensure_collection(&mut self, def: &CollectionDef) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let added = ensure_in(&tx, def)?;
        tx.commit()?;
        let created = added.is_none();
        let mut report = SchemaReport::default();
        report.note(&def.name, added);
        report.log_created();
        Ok(created)
    }

    fn has_collection(&self, collection: &str) -> Result<bool, StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT name FROM collections ORDER BY position")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn collection_def(&self, collection: &str) -> Result<Option<CollectionDef>, StoreError> {
        Ok(load_collection(&self.conn, collection)?.map(|row| row.def))
    }

    fn next_key(&self, collection: &str) -> Result<Option<RecordKey>, StoreError> {
        Ok(require_collection(&self.conn, collection)?.next_key)
    }

    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    fn put(&mut self, collection: &str, record: Record) -> Result<RecordKey, StoreError> {
        let tx = self.conn.transaction()?;
        let CollectionRow { def, mut next_key } = require_collection(&tx, collection)?;
        let key = put_record(&tx, &def, &mut next_key, record)?;
        set_next_key(&tx, collection, next_key)?;
        tx.commit()?;
        Ok(key)
    }

    fn put_many(
        &mut self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<RecordKey>, StoreError> {
        let tx = self.conn.transaction()?;
        let row = require_collection(&tx, collection)?;
        let keys = put_all(&tx, row, records)?;
        tx.commit()?;
        Ok(keys)
    }

    fn delete(&mut self, collection: &str, key: RecordKey) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        require_collection(&tx, collection)?;
        tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND record_key = ?2",
            params![collection, key.0],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_many(&mut self, collection: &str, keys: &[RecordKey]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        require_collection(&tx, collection)?;
        let mut failed = Vec::new();
        {
            let mut stmt = tx.prepare_cached(
                "DELETE FROM records WHERE collection = ?1 AND record_key = ?2",
            )?;
            for &key in keys {
                if let Err(e) = stmt.execute(params![collection, key.0]) {
                    failed.push(KeyFailure {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if !failed.is_empty() {
            // Dropping the transaction rolls back the keys that did succeed.
            return Err(StoreError::PartialFailure {
                collection: collection.to_string(),
                failed,
            });
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self, collection: &str) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        require_collection(&tx, collection)?;
        clear_collection(&tx, collection)?;
        tx.commit()?;
        Ok(())
    }

    fn replace_all(
        &mut self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<RecordKey>, StoreError> {
        let tx = self.conn.transaction()?;
        let row = require_collection(&tx, collection)?;
        clear_collection(&tx, collection)?;
        let keys = put_all(&tx, row, records)?;
        tx.commit()?;
        Ok(keys)
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        require_collection(&self.conn, collection)?;
        let mut stmt = self.conn.prepare_cached(
            "SELECT record_json FROM records WHERE collection = ?1 ORDER BY record_key",
        )?;
        let rows = stmt.query_map(params![collection], |row| row.get(0))?;
        collect_records(rows)
    }

    fn get(&self, collection: &str, key: RecordKey) -> Result<Option<Record>, StoreError> {
        require_collection(&self.conn, collection)?;
        let row: Option<String> = self
            .conn
            .query_row(
                "SELECT record_json FROM records WHERE collection = ?1 AND record_key = ?2",
                params![collection, key.0],
                |row| row.get(0),
            )
            .optional()?;
        match row {
            Some(record_json) => Ok(Some(serde_json::from_str(&record_json)?)),
            None => Ok(None),
        }
    }

    fn get_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        let CollectionRow { def, .. } = require_collection(&self.conn, collection)?;
        let index_def = def.index(index).ok_or_else(|| StoreError::IndexNotFound {
            collection: collection.to_string(),
            index: index.to_string(),
        })?;
        let Some(index_key) = index_def.query_key(value) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare_cached(
            "SELECT r.record_json
             FROM index_entries e
             JOIN records r ON r.collection = e.collection AND r.record_key = e.record_key
             WHERE e.collection = ?1 AND e.index_name = ?2 AND e.index_key = ?3
             ORDER BY r.record_key",
        )?;
        let rows = stmt.query_map(params![collection, index, index_key.as_str()], |row| {
            row.get(0)
        })?;
        collect_records(rows)
    }

    fn count(&self, collection: &str) -> Result<usize, StoreError> {
        require_collection(&self.conn, collection)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
