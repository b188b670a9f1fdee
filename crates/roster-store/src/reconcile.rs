//! Additive schema reconciliation shared by every backend.
//!
//! Compares a declared definition with the persisted one and reports what
//! has to be created. Nothing is ever dropped, renamed or rewritten; a
//! declared definition that contradicts the persisted one is a
//! [`StoreError::SchemaConflict`].

use roster_core::{CollectionDef, IndexDef};

use crate::error::StoreError;

/// Rejects a declared version older than the persisted one.
pub(crate) fn check_version(persisted: Option<u32>, requested: u32) -> Result<(), StoreError> {
    match persisted {
        Some(persisted) if requested < persisted => Err(StoreError::SchemaVersion {
            persisted,
            requested,
        }),
        _ => Ok(()),
    }
}

/// Indexes declared on `declared` that `existing` lacks.
pub(crate) fn missing_indexes(
    existing: &CollectionDef,
    declared: &CollectionDef,
) -> Result<Vec<IndexDef>, StoreError> {
    if existing.key_path != declared.key_path {
        return Err(StoreError::SchemaConflict {
            collection: declared.name.clone(),
            reason: format!(
                "primary key path is '{}', declared '{}'",
                existing.key_path, declared.key_path
            ),
        });
    }
    if existing.auto_increment != declared.auto_increment {
        return Err(StoreError::SchemaConflict {
            collection: declared.name.clone(),
            reason: format!(
                "auto_increment is {}, declared {}",
                existing.auto_increment, declared.auto_increment
            ),
        });
    }

    let mut missing = Vec::new();
    for index in &declared.indexes {
        match existing.index(&index.name) {
            Some(current) if current == index => {}
            Some(current) => {
                return Err(StoreError::SchemaConflict {
                    collection: declared.name.clone(),
                    reason: format!(
                        "index '{}' is over {} (unique: {}), declared over {} (unique: {})",
                        index.name, current.key_path, current.unique, index.key_path, index.unique
                    ),
                })
            }
            None => missing.push(index.clone()),
        }
    }
    Ok(missing)
}
