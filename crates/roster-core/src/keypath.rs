//! Key paths and the canonical index-key encoding.
//!
//! A [`KeyPath`] names the field (or ordered tuple of fields) an index is
//! built over. An [`IndexKey`] is the canonical string form of the value(s)
//! found at a key path, shared by every backend so that "equal" means the
//! same thing in memory and on disk.
//!
//! Valid key components are numbers, strings, and arrays of valid
//! components. `null`, booleans and objects are not keys: a record whose
//! indexed field is missing or holds one of those is simply left out of the
//! index.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::CoreError;
use crate::record::Record;

/// The field path (or ordered tuple of field paths) an index is keyed by.
///
/// Serialized as a bare string for a single path and as an array of
/// strings for a composite path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    /// One (possibly dotted) field path.
    Single(String),
    /// An ordered tuple of field paths, matched by exact tuple equality.
    Composite(Vec<String>),
}

impl KeyPath {
    /// A single-field key path.
    pub fn single(path: impl Into<String>) -> Self {
        KeyPath::Single(path.into())
    }

    /// A composite key path over the given fields, in order.
    pub fn composite<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeyPath::Composite(paths.into_iter().map(Into::into).collect())
    }

    /// Whether this is a composite (tuple) key path.
    pub fn is_composite(&self) -> bool {
        matches!(self, KeyPath::Composite(_))
    }

    /// The individual field paths, in order.
    pub fn paths(&self) -> &[String] {
        match self {
            KeyPath::Single(path) => std::slice::from_ref(path),
            KeyPath::Composite(paths) => paths,
        }
    }

    /// Checks that every path is non-empty and has no empty segments.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let KeyPath::Composite(paths) = self {
            if paths.is_empty() {
                return Err(CoreError::InvalidKeyPath {
                    path: self.to_string(),
                    reason: "composite key path has no fields".to_string(),
                });
            }
        }
        self.paths().iter().try_for_each(|path| validate_path(path))
    }
}

/// Checks a single dotted field path.
pub fn validate_path(path: &str) -> Result<(), CoreError> {
    if path.is_empty() {
        return Err(CoreError::InvalidKeyPath {
            path: path.to_string(),
            reason: "empty path".to_string(),
        });
    }
    if path.split('.').any(str::is_empty) {
        return Err(CoreError::InvalidKeyPath {
            path: path.to_string(),
            reason: "empty path segment".to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => write!(f, "{path}"),
            KeyPath::Composite(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

/// Canonical encoding of an index key.
///
/// Numbers are normalized so that `5`, `5.0` and `5e0` encode identically,
/// and `-0.0` encodes as `0`. Composite keys encode as a JSON array of
/// their normalized components.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(String);

impl IndexKey {
    /// Computes the key a record contributes to an index over `path`.
    ///
    /// Returns `None` when any component is missing or not a valid key.
    pub fn from_record(record: &Record, path: &KeyPath) -> Option<IndexKey> {
        match path {
            KeyPath::Single(field) => canonical(record.resolve(field)?).map(Self::encode),
            KeyPath::Composite(fields) => fields
                .iter()
                .map(|field| record.resolve(field).and_then(canonical))
                .collect::<Option<Vec<_>>>()
                .map(|parts| Self::encode(Value::Array(parts))),
        }
    }

    /// Computes the key a query value addresses in an index over `path`.
    ///
    /// A composite path expects an array of matching arity; anything else
    /// addresses no key and yields `None`.
    pub fn from_query(value: &Value, path: &KeyPath) -> Option<IndexKey> {
        match path {
            KeyPath::Single(_) => canonical(value).map(Self::encode),
            KeyPath::Composite(fields) => {
                let items = value.as_array()?;
                if items.len() != fields.len() {
                    return None;
                }
                items
                    .iter()
                    .map(canonical)
                    .collect::<Option<Vec<_>>>()
                    .map(|parts| Self::encode(Value::Array(parts)))
            }
        }
    }

    /// The encoded form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn encode(value: Value) -> IndexKey {
        IndexKey(value.to_string())
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonical(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => Some(canonical_number(n)),
        Value::String(_) => Some(value.clone()),
        Value::Array(items) => items
            .iter()
            .map(canonical)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Value::Null | Value::Bool(_) | Value::Object(_) => None,
    }
}

fn canonical_number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::from(i);
    }
    if let Some(u) = n.as_u64() {
        return Value::from(u);
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Value::from(f as i64)
        }
        _ => Value::Number(n.clone()),
    }
}
