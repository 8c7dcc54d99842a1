use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::debug;

use crate::error::{LocateError, Result};
use crate::store::StoreOptions;

pub async fn connect(location: &Path, options: &StoreOptions) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = location.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LocateError::StorageUnavailable(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(location)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(options.busy_timeout);

    debug!(location = %location.display(), "opening index database");

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            LocateError::StorageUnavailable(format!("{}: {}", location.display(), e))
        })?;

    Ok(pool)
}
