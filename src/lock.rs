//! Single-writer coordination for the index.
//!
//! SQLite serializes individual transactions, but a reconciliation spans a
//! whole scan plus two write batches. An advisory lock file next to the
//! database (`index.db` → `index.db.lock`) makes the whole run exclusive
//! across threads and processes. The OS drops the lock when the holder's file
//! handle closes, including on a crash, so a dead scan never wedges the next.
//!
//! Uses `fs2` for cross-platform `flock`/`LockFileEx`.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{LocateError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Holds the exclusive writer lock until dropped.
pub struct WriteLockGuard {
    _file: File,
    lock_path: PathBuf,
}

impl WriteLockGuard {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for WriteLockGuard {
    fn drop(&mut self) {
        // Unlocked when the file handle closes
        debug!("Releasing index write lock: {}", self.lock_path.display());
    }
}

impl std::fmt::Debug for WriteLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteLockGuard")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

/// Lock file path for a database path.
///
/// - `/data/index.db` → `/data/index.db.lock`
/// - `/data/index` → `/data/index.lock`
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut lock_path = db_path.to_path_buf();
    match lock_path.extension() {
        Some(ext) => {
            let new_ext = format!("{}.lock", ext.to_string_lossy());
            lock_path.set_extension(new_ext);
        }
        None => {
            lock_path.set_extension("lock");
        }
    }
    lock_path
}

/// Non-blocking attempt at the writer lock.
pub fn try_lock(db_path: &Path) -> Result<WriteLockGuard> {
    let lock_path = lock_path_for(db_path);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| {
            LocateError::StorageUnavailable(format!(
                "cannot open lock file {}: {}",
                lock_path.display(),
                e
            ))
        })?;

    // Fully qualified so newer std `File` locking methods are not picked up
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => Ok(WriteLockGuard {
            _file: file,
            lock_path,
        }),
        Err(e) if is_contended(&e) => Err(LocateError::ReconciliationInProgress(lock_path)),
        Err(e) => Err(LocateError::StorageUnavailable(format!(
            "cannot lock {}: {}",
            lock_path.display(),
            e
        ))),
    }
}

/// Acquires the writer lock, retrying until `timeout` elapses.
///
/// The wait is bounded: a second writer fails with
/// [`LocateError::ReconciliationInProgress`] instead of queueing.
pub async fn acquire(db_path: &Path, timeout: Duration) -> Result<WriteLockGuard> {
    let deadline = Instant::now() + timeout;
    loop {
        match try_lock(db_path) {
            Ok(guard) => {
                info!("Acquired index write lock: {}", guard.lock_path.display());
                return Ok(guard);
            }
            Err(LocateError::ReconciliationInProgress(path)) => {
                if Instant::now() >= deadline {
                    debug!("Write lock still held after {:?}", timeout);
                    return Err(LocateError::ReconciliationInProgress(path));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    match (err.raw_os_error(), fs2::lock_contended_error().raw_os_error()) {
        (Some(code), Some(contended)) => code == contended,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            lock_path_for(Path::new("/data/index.db")),
            PathBuf::from("/data/index.db.lock")
        );
        assert_eq!(
            lock_path_for(Path::new("/data/index")),
            PathBuf::from("/data/index.lock")
        );
        assert_eq!(
            lock_path_for(Path::new("/data/my.index.db")),
            PathBuf::from("/data/my.index.db.lock")
        );
    }

    #[test]
    fn second_try_lock_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("index.db");

        let guard = try_lock(&db).unwrap();
        assert!(guard.lock_path().exists());
        assert!(matches!(
            try_lock(&db),
            Err(LocateError::ReconciliationInProgress(_))
        ));

        drop(guard);
        let _again = try_lock(&db).unwrap();
    }

    #[tokio::test]
    async fn acquire_gives_up_after_timeout() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("index.db");

        let _held = try_lock(&db).unwrap();
        let started = Instant::now();
        let result = acquire(&db, Duration::from_millis(60)).await;
        assert!(matches!(
            result,
            Err(LocateError::ReconciliationInProgress(_))
        ));
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("index.db");

        let held = try_lock(&db).unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(held);
        });

        let guard = acquire(&db, Duration::from_secs(2)).await;
        assert!(guard.is_ok());
        release.await.unwrap();
    }
}
