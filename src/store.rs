//! SQLite-backed index store.
//!
//! Owns the schema, transactional batch writes, and the lazy read paths used
//! by reconciliation and queries. Every write method runs as one transaction:
//! a failure anywhere in the batch rolls the whole batch back, so readers see
//! either the pre-batch or the post-batch snapshot and nothing in between.
//!
//! Reads are streams over a live `sqlx` row cursor. In WAL mode each stream
//! observes one consistent snapshot for its whole lifetime, even while a
//! reconciliation commits alongside it. Dropping a stream returns its
//! connection to the pool.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`open`](IndexStore::open) | Open or create the store, creating the schema |
//! | [`upsert`](IndexStore::upsert) | Insert or overwrite records, atomically |
//! | [`delete`](IndexStore::delete) | Remove records by path, atomically |
//! | [`scan_all`](IndexStore::scan_all) | Every record in storage order |
//! | [`scan_prefix`](IndexStore::scan_prefix) | A directory and everything under it |
//! | [`find_by_name_pattern`](IndexStore::find_by_name_pattern) | Records passing a predicate |
//! | [`get`](IndexStore::get) | Point lookup by path |
//! | [`close`](IndexStore::close) | Release all connections |

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::IndexConfig;
use crate::db;
use crate::error::{LocateError, Result};
use crate::migrate;
use crate::models::{fold_case, EntryKind, EntryRecord, ReconcileSummary};

/// A lazy, forward-only sequence of records read from the store.
pub type EntryStream<'a> = BoxStream<'a, Result<EntryRecord>>;

const SQL_SCAN_ALL: &str =
    "SELECT path, name, size, modified_at, kind FROM entries ORDER BY path";
const SQL_NAME_CONTAINS: &str = "SELECT path, name, size, modified_at, kind FROM entries \
     WHERE instr(name, ?1) > 0 ORDER BY path";
const SQL_NAME_CONTAINS_FOLDED: &str = "SELECT path, name, size, modified_at, kind FROM entries \
     WHERE instr(name_folded, ?1) > 0 ORDER BY path";
const SQL_NAME_PREFIX: &str = "SELECT path, name, size, modified_at, kind FROM entries \
     WHERE name GLOB ?1 ORDER BY path";
const SQL_NAME_PREFIX_FOLDED: &str = "SELECT path, name, size, modified_at, kind FROM entries \
     WHERE name_folded GLOB ?1 ORDER BY path";
const SQL_PATH_CONTAINS: &str = "SELECT path, name, size, modified_at, kind FROM entries \
     WHERE instr(path, ?1) > 0 ORDER BY path";
const SQL_PATH_PREFIX: &str = "SELECT path, name, size, modified_at, kind FROM entries \
     WHERE path GLOB ?1 ORDER BY path";
const SQL_GET: &str =
    "SELECT path, name, size, modified_at, kind FROM entries WHERE path = ?1";
const SQL_SUBTREE: &str = "SELECT path, name, size, modified_at, kind FROM entries \
     WHERE path = ?1 OR path GLOB ?2 ORDER BY path";

/// Connection and locking knobs for an [`IndexStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a statement waits on SQLite's own locks.
    pub busy_timeout: Duration,
    /// Bounded wait for the reconciliation writer lock.
    pub lock_timeout: Duration,
    pub max_connections: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&IndexConfig::default())
    }
}

impl From<&IndexConfig> for StoreOptions {
    fn from(config: &IndexConfig) -> Self {
        Self {
            busy_timeout: config.busy_timeout(),
            lock_timeout: config.lock_timeout(),
            max_connections: config.max_connections,
        }
    }
}

/// Storage-level narrowing applied before the caller's predicate.
///
/// Needles are passed through as given: folded variants expect an already
/// case-folded needle (see [`fold_case`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefilter {
    /// Full scan.
    All,
    NameContains(String),
    NameContainsFolded(String),
    /// Range over the name index.
    NamePrefix(String),
    NamePrefixFolded(String),
    PathContains(String),
    /// Range over the primary key.
    PathPrefix(String),
}

impl Prefilter {
    fn sql(&self) -> (&'static str, Option<String>) {
        match self {
            Prefilter::All => (SQL_SCAN_ALL, None),
            Prefilter::NameContains(n) => (SQL_NAME_CONTAINS, Some(n.clone())),
            Prefilter::NameContainsFolded(n) => (SQL_NAME_CONTAINS_FOLDED, Some(n.clone())),
            Prefilter::NamePrefix(p) => (SQL_NAME_PREFIX, Some(prefix_glob(p))),
            Prefilter::NamePrefixFolded(p) => (SQL_NAME_PREFIX_FOLDED, Some(prefix_glob(p))),
            Prefilter::PathContains(n) => (SQL_PATH_CONTAINS, Some(n.clone())),
            Prefilter::PathPrefix(p) => (SQL_PATH_PREFIX, Some(prefix_glob(p))),
        }
    }
}

/// Entry counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexCounts {
    pub files: u64,
    pub directories: u64,
}

impl IndexCounts {
    pub fn total(&self) -> u64 {
        self.files + self.directories
    }
}

/// One row of reconciliation history.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationRecord {
    pub finished_at: DateTime<Utc>,
    pub source: String,
    pub summary: ReconcileSummary,
}

/// Durable, crash-consistent table of [`EntryRecord`]s keyed by path.
pub struct IndexStore {
    pool: SqlitePool,
    location: PathBuf,
    options: StoreOptions,
}

impl IndexStore {
    /// Opens or creates the store at `location` with default options.
    pub async fn open(location: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(location, StoreOptions::default()).await
    }

    pub async fn open_with(location: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let location = location.as_ref().to_path_buf();
        let pool = db::connect(&location, &options).await?;

        if let Err(e) = migrate::run_migrations(&pool).await {
            pool.close().await;
            return Err(e);
        }

        info!(location = %location.display(), "index store open");
        Ok(Self {
            pool,
            location,
            options,
        })
    }

    /// Opens the store described by the `[index]` config section.
    pub async fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::open_with(&config.path, StoreOptions::from(config)).await
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Inserts or overwrites `entries` keyed by path, as one transaction.
    ///
    /// Returns the number of rows written. On any failure nothing from the
    /// batch is visible.
    pub async fn upsert(&self, entries: &[EntryRecord]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let rows = entries
            .iter()
            .map(|e| {
                let size = i64::try_from(e.size).map_err(|_| {
                    LocateError::InvalidEntry(format!("size out of range for {}", e.path))
                })?;
                Ok((e, size))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(LocateError::StorageWriteFailed)?;

        for (entry, size) in rows {
            sqlx::query(
                r#"
                INSERT INTO entries (path, name, name_folded, size, modified_at, kind)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(path) DO UPDATE SET
                    name = excluded.name,
                    name_folded = excluded.name_folded,
                    size = excluded.size,
                    modified_at = excluded.modified_at,
                    kind = excluded.kind
                "#,
            )
            .bind(&entry.path)
            .bind(&entry.name)
            .bind(fold_case(&entry.name))
            .bind(size)
            .bind(entry.modified_at)
            .bind(entry.kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(LocateError::StorageWriteFailed)?;
        }

        tx.commit().await.map_err(LocateError::StorageWriteFailed)?;

        debug!(count = entries.len(), "upserted entries");
        Ok(entries.len() as u64)
    }

    /// Removes records by path, as one transaction. Unknown paths are ignored.
    pub async fn delete(&self, paths: &[String]) -> Result<u64> {
        self.delete_batch(paths, None).await
    }

    /// Removes records and appends a reconciliation history row in the same
    /// transaction.
    pub async fn delete_and_record(
        &self,
        paths: &[String],
        source: &str,
        summary: &ReconcileSummary,
    ) -> Result<u64> {
        self.delete_batch(paths, Some((source, summary))).await
    }

    async fn delete_batch(
        &self,
        paths: &[String],
        record: Option<(&str, &ReconcileSummary)>,
    ) -> Result<u64> {
        if paths.is_empty() && record.is_none() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(LocateError::StorageWriteFailed)?;

        let mut removed = 0u64;
        for path in paths {
            let result = sqlx::query("DELETE FROM entries WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await
                .map_err(LocateError::StorageWriteFailed)?;
            removed += result.rows_affected();
        }

        if let Some((source, summary)) = record {
            sqlx::query(
                r#"
                INSERT INTO reconciliations (finished_at, source, inserted, updated, deleted, unchanged)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Utc::now().timestamp())
            .bind(source)
            .bind(summary.inserted as i64)
            .bind(summary.updated as i64)
            .bind(summary.deleted as i64)
            .bind(summary.unchanged as i64)
            .execute(&mut *tx)
            .await
            .map_err(LocateError::StorageWriteFailed)?;
        }

        tx.commit().await.map_err(LocateError::StorageWriteFailed)?;

        debug!(count = removed, "deleted entries");
        Ok(removed)
    }

    /// Every record, in storage (path) order.
    pub fn scan_all(&self) -> EntryStream<'_> {
        self.stream(SQL_SCAN_ALL, Vec::new())
    }

    /// `dir` itself plus every record whose path lies beneath it.
    pub fn scan_prefix(&self, dir: &str) -> EntryStream<'_> {
        let trimmed = dir.trim_end_matches('/');
        let children = format!("{}/*", escape_glob(trimmed));
        let exact = if trimmed.is_empty() { "/" } else { trimmed };
        self.stream(SQL_SUBTREE, vec![exact.to_string(), children])
    }

    /// Records passing `predicate`, in storage order.
    ///
    /// The store knows nothing about matching semantics. `prefilter` narrows
    /// the rows SQLite returns; `predicate` is then evaluated exactly once per
    /// returned row, lazily, as the stream is polled.
    pub fn find_by_name_pattern<'a, P>(&'a self, prefilter: Prefilter, mut predicate: P) -> EntryStream<'a>
    where
        P: FnMut(&EntryRecord) -> bool + Send + 'a,
    {
        let (sql, needle) = prefilter.sql();
        self.stream(sql, needle.into_iter().collect())
            .try_filter(move |entry| future::ready(predicate(entry)))
            .boxed()
    }

    pub async fn get(&self, path: &str) -> Result<Option<EntryRecord>> {
        let row = sqlx::query(SQL_GET)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(LocateError::unavailable)?;

        row.as_ref().map(row_to_entry).transpose()
    }

    pub async fn count(&self) -> Result<IndexCounts> {
        let rows = sqlx::query("SELECT kind, COUNT(*) AS n FROM entries GROUP BY kind")
            .fetch_all(&self.pool)
            .await
            .map_err(LocateError::unavailable)?;

        let mut counts = IndexCounts::default();
        for row in &rows {
            let kind: String = row.try_get("kind").map_err(LocateError::unavailable)?;
            let n: i64 = row.try_get("n").map_err(LocateError::unavailable)?;
            match EntryKind::parse(&kind) {
                Some(EntryKind::File) => counts.files = n as u64,
                Some(EntryKind::Directory) => counts.directories = n as u64,
                None => {
                    return Err(LocateError::StorageUnavailable(format!(
                        "unknown entry kind in index: {}",
                        kind
                    )))
                }
            }
        }
        Ok(counts)
    }

    pub async fn last_reconciliation(&self) -> Result<Option<ReconciliationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT finished_at, source, inserted, updated, deleted, unchanged
            FROM reconciliations
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(LocateError::unavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let get = |col: &str| -> Result<i64> { row.try_get(col).map_err(LocateError::unavailable) };
        let finished_at = DateTime::from_timestamp(get("finished_at")?, 0).unwrap_or_default();

        Ok(Some(ReconciliationRecord {
            finished_at,
            source: row.try_get("source").map_err(LocateError::unavailable)?,
            summary: ReconcileSummary {
                inserted: get("inserted")? as u64,
                updated: get("updated")? as u64,
                deleted: get("deleted")? as u64,
                unchanged: get("unchanged")? as u64,
            },
        }))
    }

    /// Releases every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
        debug!(location = %self.location.display(), "index store closed");
    }

    fn stream(&self, sql: &'static str, binds: Vec<String>) -> EntryStream<'_> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(value);
        }
        query
            .fetch(&self.pool)
            .map(|row| {
                row.map_err(LocateError::unavailable)
                    .and_then(|r| row_to_entry(&r))
            })
            .boxed()
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<EntryRecord> {
    let kind: String = row.try_get("kind").map_err(LocateError::unavailable)?;
    let size: i64 = row.try_get("size").map_err(LocateError::unavailable)?;
    Ok(EntryRecord {
        path: row.try_get("path").map_err(LocateError::unavailable)?,
        name: row.try_get("name").map_err(LocateError::unavailable)?,
        size: size.max(0) as u64,
        modified_at: row.try_get("modified_at").map_err(LocateError::unavailable)?,
        kind: EntryKind::parse(&kind).ok_or_else(|| {
            LocateError::StorageUnavailable(format!("unknown entry kind in index: {}", kind))
        })?,
    })
}

/// Escapes GLOB metacharacters so `value` matches literally.
fn escape_glob(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

fn prefix_glob(prefix: &str) -> String {
    format!("{}*", escape_glob(prefix))
}
