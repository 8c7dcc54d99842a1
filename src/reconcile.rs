//! Reconciliation: bring the index into agreement with one complete scan.
//!
//! The run holds the writer lock from start to finish, then:
//!
//! 1. drains the scan into a path-keyed map (rejecting incomplete scans),
//! 2. streams the current snapshot once, classifying each stored record as
//!    unchanged, updated, or deleted against the map,
//! 3. treats whatever is left in the map as insertions,
//! 4. writes inserts and updates as one atomic upsert batch, then deletions
//!    (plus the history row) as one atomic delete batch.
//!
//! Renames are not detected: a moved entry is a delete of the old path and
//! an insert of the new one.

use futures::TryStreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{LocateError, Result};
use crate::lock;
use crate::models::{EntryRecord, ReconcileSummary};
use crate::scan::{ScanResult, Scanner};
use crate::store::IndexStore;

/// The writes one reconciliation will perform.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub inserts: Vec<EntryRecord>,
    pub updates: Vec<EntryRecord>,
    pub deletes: Vec<String>,
    pub unchanged: u64,
}

impl ReconcilePlan {
    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            inserted: self.inserts.len() as u64,
            updated: self.updates.len() as u64,
            deleted: self.deletes.len() as u64,
            unchanged: self.unchanged,
        }
    }
}

/// Reconciles `store` against one scan result.
///
/// `source` labels the run in the reconciliation history. Fails fast with
/// `ReconciliationInProgress` when another run holds the writer lock, and
/// with `ScanIncomplete` (index untouched) when the scan never completed.
pub async fn reconcile(store: &IndexStore, source: &str, scan: ScanResult) -> Result<ReconcileSummary> {
    let _guard = lock::acquire(store.location(), store.options().lock_timeout).await?;
    reconcile_locked(store, source, scan).await
}

/// Runs `scanner` and reconciles its output in one step.
///
/// The writer lock is taken before the scanner starts, so a second
/// concurrent run fails without walking anything. A scanner that fails
/// before sending any entry (unreadable root, malformed first line) is
/// reported with its own error. One that fails mid-stream yields
/// `ScanIncomplete` carrying the scanner's error as its cause.
pub async fn reconcile_from(
    store: &IndexStore,
    scanner: Arc<dyn Scanner>,
    channel_capacity: usize,
) -> Result<ReconcileSummary> {
    let _guard = lock::acquire(store.location(), store.options().lock_timeout).await?;

    let source = scanner.name();
    let (sink, scan) = ScanResult::channel(channel_capacity);
    let worker = {
        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move { scanner.scan(sink).await })
    };

    let outcome = reconcile_locked(store, &source, scan).await;
    let scanned = worker
        .await
        .map_err(|e| LocateError::Scanner(format!("scanner task failed: {}", e)))?;

    match (outcome, scanned) {
        // Nothing was produced: the scanner could not start at all
        (Err(LocateError::ScanIncomplete { received: 0, .. }), Err(scan_err)) => Err(scan_err),
        (Err(LocateError::ScanIncomplete { received, .. }), Err(scan_err)) => {
            warn!(received, "scanner {} failed mid-stream: {}", source, scan_err);
            Err(LocateError::ScanIncomplete {
                received,
                cause: Some(scan_err.to_string()),
            })
        }
        (outcome, _) => outcome,
    }
}

async fn reconcile_locked(store: &IndexStore, source: &str, scan: ScanResult) -> Result<ReconcileSummary> {
    let incoming = scan.collect().await?;
    let plan = plan(store, incoming).await?;
    let summary = plan.summary();

    apply(store, source, plan).await?;

    info!(
        source,
        inserted = summary.inserted,
        updated = summary.updated,
        deleted = summary.deleted,
        unchanged = summary.unchanged,
        "reconciliation complete"
    );
    Ok(summary)
}

/// Diffs `incoming` against the stored snapshot in a single streaming pass.
pub async fn plan(store: &IndexStore, mut incoming: HashMap<String, EntryRecord>) -> Result<ReconcilePlan> {
    let mut plan = ReconcilePlan::default();

    let mut existing = store.scan_all();
    while let Some(old) = existing.try_next().await? {
        match incoming.remove(&old.path) {
            Some(new) if new == old => plan.unchanged += 1,
            Some(new) => plan.updates.push(new),
            None => plan.deletes.push(old.path),
        }
    }
    drop(existing);

    plan.inserts = incoming.into_values().collect();
    plan.inserts.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(plan)
}

async fn apply(store: &IndexStore, source: &str, plan: ReconcilePlan) -> Result<()> {
    let summary = plan.summary();

    let mut upserts = plan.inserts;
    upserts.extend(plan.updates);
    store.upsert(&upserts).await?;

    store
        .delete_and_record(&plan.deletes, source, &summary)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryKind;
    use crate::scan::ScanMessage;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, IndexStore) {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::open(tmp.path().join("index.db")).await.unwrap();
        (tmp, store)
    }

    fn keyed(entries: &[EntryRecord]) -> HashMap<String, EntryRecord> {
        entries.iter().map(|e| (e.path.clone(), e.clone())).collect()
    }

    #[tokio::test]
    async fn plan_classifies_every_path() {
        let (_tmp, store) = open_temp().await;
        store
            .upsert(&[
                EntryRecord::file("/keep", 1, 1).unwrap(),
                EntryRecord::file("/grow", 1, 1).unwrap(),
                EntryRecord::file("/gone", 1, 1).unwrap(),
                EntryRecord::file("/flip", 1, 1).unwrap(),
            ])
            .await
            .unwrap();

        let incoming = keyed(&[
            EntryRecord::file("/keep", 1, 1).unwrap(),
            EntryRecord::file("/grow", 2, 1).unwrap(),
            EntryRecord::new("/flip", 0, 1, EntryKind::Directory).unwrap(),
            EntryRecord::file("/new", 3, 1).unwrap(),
        ]);

        let plan = plan(&store, incoming).await.unwrap();
        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.deletes, vec!["/gone".to_string()]);
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].path, "/new");

        let mut updated: Vec<&str> = plan.updates.iter().map(|e| e.path.as_str()).collect();
        updated.sort();
        assert_eq!(updated, vec!["/flip", "/grow"]);
    }

    #[tokio::test]
    async fn incomplete_scan_leaves_index_untouched() {
        let (_tmp, store) = open_temp().await;
        store
            .upsert(&[EntryRecord::file("/old", 1, 1).unwrap()])
            .await
            .unwrap();

        let scan = ScanResult::from_messages(vec![ScanMessage::Entry(
            EntryRecord::file("/new", 1, 1).unwrap(),
        )]);
        let result = reconcile(&store, "test", scan).await;

        assert!(matches!(result, Err(LocateError::ScanIncomplete { .. })));
        assert!(store.get("/old").await.unwrap().is_some());
        assert!(store.get("/new").await.unwrap().is_none());
        assert!(store.last_reconciliation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_recorded_in_history() {
        let (_tmp, store) = open_temp().await;
        let scan = ScanResult::from_entries(vec![EntryRecord::file("/a", 1, 1).unwrap()]);
        let summary = reconcile(&store, "walk:/", scan).await.unwrap();

        let last = store.last_reconciliation().await.unwrap().unwrap();
        assert_eq!(last.summary, summary);
        assert_eq!(last.source, "walk:/");
    }

    #[tokio::test]
    async fn lock_released_after_run() {
        let (_tmp, store) = open_temp().await;
        reconcile(&store, "t", ScanResult::from_entries(vec![]))
            .await
            .unwrap();
        assert!(lock::try_lock(store.location()).is_ok());
    }
}
