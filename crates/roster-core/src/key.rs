//! Primary key newtype for stored records.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::record::value_kind;

/// Primary key of a record within its collection.
///
/// Auto-assigned keys and caller-supplied keys share one integer key space,
/// so both order the same way. The inner `i64` aligns with SQLite's
/// `INTEGER` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(pub i64);

impl RecordKey {
    /// First key handed out by a fresh key generator.
    pub const FIRST: RecordKey = RecordKey(1);

    /// Interprets a JSON value as a record key.
    ///
    /// Integral numbers are accepted, including floats such as `3.0`.
    pub fn from_value(value: &Value) -> Result<RecordKey, CoreError> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(RecordKey(i));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        Ok(RecordKey(f as i64))
                    }
                    _ => Err(CoreError::InvalidKey {
                        reason: format!("{n} is not an integral key in range"),
                    }),
                }
            }
            other => Err(CoreError::InvalidKey {
                reason: format!("expected an integer key, found {}", value_kind(other)),
            }),
        }
    }

    /// The key following this one, or `None` past `i64::MAX`.
    pub fn next(self) -> Option<RecordKey> {
        self.0.checked_add(1).map(RecordKey)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordKey {
    fn from(value: i64) -> Self {
        RecordKey(value)
    }
}

impl From<RecordKey> for Value {
    fn from(key: RecordKey) -> Self {
        Value::from(key.0)
    }
}
