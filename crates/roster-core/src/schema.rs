//! Collection, index and schema definitions.
//!
//! A [`SchemaDef`] is the declared table of collections a store is opened
//! with. Schema changes are additive only: opening a store with a schema
//! adds whatever collections and indexes are missing and never drops,
//! renames or rewrites anything.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::keypath::{validate_path, IndexKey, KeyPath};
use crate::record::Record;

/// A secondary index over one field or an ordered tuple of fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its collection.
    pub name: String,
    /// Field path(s) the index is keyed by.
    pub key_path: KeyPath,
    /// Whether two records may share one key.
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    /// A non-unique index.
    pub fn new(name: impl Into<String>, key_path: KeyPath) -> Self {
        IndexDef {
            name: name.into(),
            key_path,
            unique: false,
        }
    }

    /// A uniqueness-enforcing index.
    pub fn unique(name: impl Into<String>, key_path: KeyPath) -> Self {
        IndexDef {
            name: name.into(),
            key_path,
            unique: true,
        }
    }

    /// A non-unique index over a single field of the same name.
    pub fn on(field: &str) -> Self {
        IndexDef::new(field, KeyPath::single(field))
    }

    /// A unique index over a single field of the same name.
    pub fn unique_on(field: &str) -> Self {
        IndexDef::unique(field, KeyPath::single(field))
    }

    /// The key `record` contributes to this index, if any.
    pub fn key_for(&self, record: &Record) -> Option<IndexKey> {
        IndexKey::from_record(record, &self.key_path)
    }

    /// The key a lookup value addresses in this index, if any.
    pub fn query_key(&self, value: &Value) -> Option<IndexKey> {
        IndexKey::from_query(value, &self.key_path)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() {
            return Err(CoreError::EmptyName { what: "index" });
        }
        self.key_path.validate()
    }
}

/// A named collection: primary key path, key generator mode and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDef {
    /// Collection name, unique within the store.
    pub name: String,
    /// Field holding the primary key.
    pub key_path: String,
    /// Whether missing primary keys are assigned on insert.
    pub auto_increment: bool,
    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl CollectionDef {
    /// A collection keyed by `id` with auto-assigned keys and no indexes.
    pub fn new(name: impl Into<String>) -> Self {
        CollectionDef {
            name: name.into(),
            key_path: "id".to_string(),
            auto_increment: true,
            indexes: Vec::new(),
        }
    }

    /// Replaces the primary key path.
    pub fn with_key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = key_path.into();
        self
    }

    /// Disables key assignment: every record must carry its own key.
    pub fn without_auto_increment(mut self) -> Self {
        self.auto_increment = false;
        self
    }

    /// Adds a secondary index.
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Looks up an index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Checks names, key paths and index-name uniqueness.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() {
            return Err(CoreError::EmptyName { what: "collection" });
        }
        validate_path(&self.key_path)?;
        let mut seen = HashSet::new();
        for index in &self.indexes {
            index.validate()?;
            if !seen.insert(index.name.as_str()) {
                return Err(CoreError::DuplicateIndex {
                    collection: self.name.clone(),
                    index: index.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The declared schema a store is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDef {
    /// Monotonically increasing schema version.
    pub version: u32,
    /// Declared collections, created in this order.
    pub collections: Vec<CollectionDef>,
}

impl SchemaDef {
    /// An empty schema at `version`.
    pub fn new(version: u32) -> Self {
        SchemaDef {
            version,
            collections: Vec::new(),
        }
    }

    /// Adds a collection.
    pub fn with_collection(mut self, collection: CollectionDef) -> Self {
        self.collections.push(collection);
        self
    }

    /// Looks up a declared collection by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Validates the version, every collection, and name uniqueness.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.version == 0 {
            return Err(CoreError::InvalidSchemaVersion {
                version: self.version,
            });
        }
        let mut seen = HashSet::new();
        for collection in &self.collections {
            collection.validate()?;
            if !seen.insert(collection.name.as_str()) {
                return Err(CoreError::DuplicateCollection {
                    collection: collection.name.clone(),
                });
            }
        }
        Ok(())
    }
}
