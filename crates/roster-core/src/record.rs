//! Records: schemaless JSON field maps.
//!
//! A [`Record`] holds whatever fields its caller supplies. The store only
//! looks at the fields named by the collection's primary key path and index
//! key paths. Dates are carried as ISO-8601 strings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::key::RecordKey;

/// A stored record: an ordered map from field name to JSON value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Record(Map::new())
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Sets a top-level field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Returns a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Resolves a dotted path (`"a.b"`) through nested objects.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Reads the primary key stored at `key_path`.
    ///
    /// A missing or `null` field means the record has no key yet.
    pub fn key(&self, key_path: &str) -> Result<Option<RecordKey>, CoreError> {
        match self.resolve(key_path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => RecordKey::from_value(value).map(Some),
        }
    }

    /// Writes `key` at `key_path`, creating intermediate objects as needed.
    pub fn set_key(&mut self, key_path: &str, key: RecordKey) -> Result<(), CoreError> {
        let segments: Vec<&str> = key_path.split('.').collect();
        let (last, parents) = segments.split_last().ok_or_else(|| CoreError::InvalidKeyPath {
            path: key_path.to_string(),
            reason: "empty path".to_string(),
        })?;

        let mut current = &mut self.0;
        for segment in parents {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match slot {
                Value::Object(map) => map,
                other => {
                    return Err(CoreError::InvalidKey {
                        reason: format!(
                            "cannot store key under '{key_path}': '{segment}' is {}",
                            value_kind(other)
                        ),
                    })
                }
            };
        }
        current.insert(last.to_string(), Value::from(key));
        Ok(())
    }

    /// Borrows the underlying field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the record, returning its field map.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Record(fields)
    }
}

impl TryFrom<Value> for Record {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Record(fields)),
            other => Err(CoreError::NotAnObject {
                found: value_kind(&other),
            }),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

/// Human-readable name of a JSON value's kind, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
