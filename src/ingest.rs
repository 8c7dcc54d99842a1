//! `update` and `ingest` commands.
//!
//! Both run a scanner into the reconciler and print the resulting summary.
//! An incomplete scan is reported as a warning and exits successfully: the
//! index is left exactly as it was.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::error::LocateError;
use crate::models::ReconcileSummary;
use crate::reconcile::reconcile_from;
use crate::scan::Scanner;
use crate::scanner_jsonl::JsonLinesScanner;
use crate::scanner_walk::WalkScanner;
use crate::store::IndexStore;

/// Walks `root` (default `scan.root`) and reconciles the index against it.
pub async fn update_index(config: &Config, root: Option<&Path>) -> Result<ReconcileSummary, LocateError> {
    let scanner = Arc::new(WalkScanner::from_config(&config.scan, root));
    reconcile_with(config, scanner).await
}

pub async fn run_update(config: &Config, root: Option<&Path>) -> Result<()> {
    let scanner: Arc<dyn Scanner> = Arc::new(WalkScanner::from_config(&config.scan, root));
    let label = scanner.name();
    report(&label, reconcile_with(config, scanner).await)
}

/// Reconciles from an external scanner's JSON-lines output (`-` = stdin).
pub async fn run_ingest(config: &Config, input: &str) -> Result<()> {
    let scanner: Arc<dyn Scanner> = Arc::new(JsonLinesScanner::from_arg(input));
    let label = scanner.name();
    report(&label, reconcile_with(config, scanner).await)
}

async fn reconcile_with(
    config: &Config,
    scanner: Arc<dyn Scanner>,
) -> Result<ReconcileSummary, LocateError> {
    let store = IndexStore::from_config(&config.index).await?;
    let outcome = reconcile_from(&store, scanner, config.scan.channel_capacity).await;
    store.close().await;
    outcome
}

fn report(label: &str, outcome: Result<ReconcileSummary, LocateError>) -> Result<()> {
    match outcome {
        Ok(summary) => {
            println!("update {}", label);
            println!("  inserted: {}", summary.inserted);
            println!("  updated: {}", summary.updated);
            println!("  deleted: {}", summary.deleted);
            println!("  unchanged: {}", summary.unchanged);
            println!("ok");
            Ok(())
        }
        Err(e) if e.is_warning() => {
            warn!("{}", e);
            eprintln!("warning: {}", e);
            println!("update {}", label);
            println!("  skipped: scan incomplete, index unchanged");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
