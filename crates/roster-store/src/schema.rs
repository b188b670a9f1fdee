//! SQL layout and migration setup for the SQLite backend.
//!
//! Uses `rusqlite_migration` to manage the store's internal tables via
//! SQLite's `user_version` pragma. Migrations are embedded at compile time
//! via `include_str!`. Declared collections live as rows in those tables,
//! so adding a collection never needs a migration.

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StoreError;

/// All internal-layout migrations, applied in order via `user_version`.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(include_str!("migrations/001_initial_schema.sql")),
        // Future migrations added here as new M::up(...) entries.
    ])
}

/// Opens (or creates) a SQLite database at `path` with WAL mode, foreign
/// keys, and all pending migrations applied.
///
/// Any failure here means the medium is unusable (bad path, permissions,
/// not a database) and is reported as [`StoreError::StoreUnavailable`].
pub fn open_database(path: &str) -> Result<Connection, StoreError> {
    open_with(path, || Connection::open(path))
}

/// Opens an in-memory SQLite database with foreign keys and all pending
/// migrations applied. Failures are reported like [`open_database`].
pub fn open_in_memory() -> Result<Connection, StoreError> {
    open_with(":memory:", Connection::open_in_memory)
}

fn open_with(
    location: &str,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> Result<Connection, StoreError> {
    let unavailable = |reason: String| StoreError::StoreUnavailable {
        location: location.to_string(),
        reason,
    };
    let mut conn = open().map_err(|e| unavailable(e.to_string()))?;
    configure_and_migrate(&mut conn).map_err(|e| unavailable(e.to_string()))?;
    Ok(conn)
}

/// Configures pragmas and applies pending migrations.
fn configure_and_migrate(conn: &mut Connection) -> Result<(), StoreError> {
    // WAL: concurrent readers alongside the single writer.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // NORMAL synchronous is safe with WAL mode.
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Foreign keys retire index entries together with their records.
    conn.pragma_update(None, "foreign_keys", "ON")?;

    migrations()
        .to_latest(conn)
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    Ok(())
}
