//! Storage-layer result types.

use std::fmt;

use roster_core::RecordKey;
use serde::{Deserialize, Serialize};

/// One key a batch delete could not process, with the cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFailure {
    /// The key that failed.
    pub key: RecordKey,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for KeyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

/// What an `ensure_schema` run changed.
///
/// Collections and indexes are listed as `collection` and
/// `(collection, index)` names in the order they were created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Version persisted before this run, if the store already existed.
    pub previous_version: Option<u32>,
    /// Version persisted after this run.
    pub version: u32,
    /// Collections created by this run.
    pub created_collections: Vec<String>,
    /// Indexes added to collections that already existed.
    pub created_indexes: Vec<(String, String)>,
}

impl SchemaReport {
    /// Whether this run changed nothing but (possibly) the version.
    pub fn is_unchanged(&self) -> bool {
        self.created_collections.is_empty() && self.created_indexes.is_empty()
    }

    /// Records the outcome of ensuring one collection: `None` when it was
    /// created, otherwise the indexes added to it.
    pub(crate) fn note(&mut self, collection: &str, added: Option<Vec<String>>) {
        match added {
            None => self.created_collections.push(collection.to_string()),
            Some(added) => self
                .created_indexes
                .extend(added.into_iter().map(|index| (collection.to_string(), index))),
        }
    }

    /// Logs what this run created. Backends call it only after committing.
    pub(crate) fn log_created(&self) {
        for collection in &self.created_collections {
            tracing::info!(collection = %collection, "created collection");
        }
        for (collection, index) in &self.created_indexes {
            tracing::info!(collection = %collection, index = %index, "created index");
        }
    }
}

/// Captures what `f` logs, as plain text.
#[cfg(test)]
pub(crate) fn captured_logs(f: impl FnOnce()) -> String {
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
