//! Primary key assignment shared by every backend.

use roster_core::{CollectionDef, Record, RecordKey};

use crate::error::StoreError;

/// Position of a collection's key generator: the next key it hands out, or
/// `None` once it has passed `i64::MAX`.
pub(crate) type KeyGenerator = Option<RecordKey>;

/// Resolves the primary key of `record`, generating one if needed.
///
/// A generated key is written into the record. An explicit key at or
/// beyond the generator moves the generator past it, so generated keys
/// never collide with explicit ones. An exhausted generator rejects keyless
/// records instead of reusing a key.
pub(crate) fn assign_key(
    def: &CollectionDef,
    next_key: &mut KeyGenerator,
    record: &mut Record,
) -> Result<RecordKey, StoreError> {
    let explicit = record
        .key(&def.key_path)
        .map_err(|e| StoreError::invalid_key(&def.name, e))?;

    match explicit {
        Some(key) => {
            if def.auto_increment && matches!(*next_key, Some(next) if key >= next) {
                *next_key = key.next();
            }
            Ok(key)
        }
        None if def.auto_increment => {
            let key = next_key.ok_or_else(|| StoreError::InvalidKey {
                collection: def.name.clone(),
                reason: "key generator is exhausted".to_string(),
            })?;
            record
                .set_key(&def.key_path, key)
                .map_err(|e| StoreError::invalid_key(&def.name, e))?;
            *next_key = key.next();
            Ok(key)
        }
        None => Err(StoreError::InvalidKey {
            collection: def.name.clone(),
            reason: format!(
                "record has no '{}' and the collection does not generate keys",
                def.key_path
            ),
        }),
    }
}
