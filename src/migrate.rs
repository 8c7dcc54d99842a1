use sqlx::SqlitePool;

use crate::error::{LocateError, Result};

/// Creates the index schema if absent. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per filesystem object, keyed and stored in path order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            path TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK (length(name) > 0),
            name_folded TEXT NOT NULL,
            size INTEGER NOT NULL CHECK (size >= 0),
            modified_at INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('file', 'directory'))
        ) WITHOUT ROWID
        "#,
    )
    .execute(pool)
    .await
    .map_err(LocateError::unavailable)?;

    // Reconciliation history, newest row read by `stats`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reconciliations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            finished_at INTEGER NOT NULL,
            source TEXT NOT NULL,
            inserted INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            deleted INTEGER NOT NULL,
            unchanged INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(LocateError::unavailable)?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_name ON entries(name)")
        .execute(pool)
        .await
        .map_err(LocateError::unavailable)?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_name_folded ON entries(name_folded)")
        .execute(pool)
        .await
        .map_err(LocateError::unavailable)?;

    Ok(())
}
