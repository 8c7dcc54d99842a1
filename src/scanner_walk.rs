//! Built-in filesystem scanner.
//!
//! Walks a root directory with `walkdir` on a blocking thread and streams
//! every file and directory beneath it (not the root itself). Excluded
//! subtrees are pruned, not just filtered. Entries that cannot be read are
//! skipped with a warning so one unreadable directory does not abort the
//! whole scan; the completion signal is sent only after the walk finishes.

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::ScanConfig;
use crate::error::{LocateError, Result};
use crate::models::{EntryKind, EntryRecord};
use crate::scan::{ScanSender, Scanner};

/// Version-control metadata directories, pruned unless explicitly included.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git", "**/.hg", "**/.svn"];

pub struct WalkScanner {
    root: PathBuf,
    exclude_globs: Vec<String>,
    follow_symlinks: bool,
}

impl WalkScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }

    pub fn from_config(config: &ScanConfig, root_override: Option<&Path>) -> Self {
        Self {
            root: root_override
                .map(Path::to_path_buf)
                .unwrap_or_else(|| config.root.clone()),
            exclude_globs: config.exclude_globs.clone(),
            follow_symlinks: config.follow_symlinks,
        }
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_globs.push(pattern.into());
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }
}

#[async_trait]
impl Scanner for WalkScanner {
    fn name(&self) -> String {
        format!("walk:{}", self.root.display())
    }

    async fn scan(&self, sink: ScanSender) -> Result<()> {
        let root = self.root.clone();
        let excludes = self.exclude_globs.clone();
        let follow = self.follow_symlinks;

        tokio::task::spawn_blocking(move || walk(&root, &excludes, follow, sink))
            .await
            .map_err(|e| LocateError::Scanner(format!("walker task failed: {}", e)))?
    }
}

fn walk(root: &Path, excludes: &[String], follow_symlinks: bool, mut sink: ScanSender) -> Result<()> {
    let root = std::fs::canonicalize(root).map_err(|e| {
        LocateError::Scanner(format!("cannot read scan root {}: {}", root.display(), e))
    })?;
    if !root.is_dir() {
        return Err(LocateError::Scanner(format!(
            "scan root is not a directory: {}",
            root.display()
        )));
    }

    let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.extend(excludes.iter().cloned());
    let exclude_set = build_globset(&patterns)?;

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_entry(|entry| !is_excluded(&root, entry, &exclude_set));

    let mut skipped = 0u64;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                skipped += 1;
                continue;
            }
        };

        match to_entry_record(&entry) {
            Ok(record) => sink.blocking_send(record)?,
            Err(e) => {
                warn!("skipping {}: {}", entry.path().display(), e);
                skipped += 1;
            }
        }
    }

    debug!(sent = sink.sent(), skipped, root = %root.display(), "walk finished");
    sink.blocking_complete()
}

fn is_excluded(root: &Path, entry: &DirEntry, exclude_set: &GlobSet) -> bool {
    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
    exclude_set.is_match(relative)
}

fn to_entry_record(entry: &DirEntry) -> Result<EntryRecord> {
    let metadata = entry
        .metadata()
        .map_err(|e| LocateError::Scanner(e.to_string()))?;
    let modified_secs = metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let kind = if entry.file_type().is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    EntryRecord::new(
        entry.path().to_string_lossy().to_string(),
        metadata.len(),
        modified_secs,
        kind,
    )
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| LocateError::Scanner(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| LocateError::Scanner(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ScanResult;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("docs/reports")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("docs/report.txt"), "hello").unwrap();
        fs::write(root.join("docs/reports/q1.csv"), "a,b").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        tmp
    }

    async fn run(scanner: WalkScanner) -> Result<Vec<EntryRecord>> {
        let (sink, scan) = ScanResult::channel(8);
        let worker = tokio::spawn(async move { scanner.scan(sink).await });
        let collected = scan.collect().await;
        worker.await.unwrap()?;
        let mut entries: Vec<EntryRecord> = collected?.into_values().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    #[tokio::test]
    async fn walks_files_and_directories() {
        let tmp = tree();
        let entries = run(WalkScanner::new(tmp.path()).exclude("node_modules")).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(names, vec!["docs", "report.txt", "reports", "q1.csv"]);

        let report = entries.iter().find(|e| e.name == "report.txt").unwrap();
        assert_eq!(report.size, 5);
        assert_eq!(report.kind, EntryKind::File);
        assert!(Path::new(&report.path).is_absolute());

        let dir = entries.iter().find(|e| e.name == "reports").unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);
        assert_eq!(dir.size, 0);
    }

    #[tokio::test]
    async fn vcs_directories_pruned_by_default() {
        let tmp = tree();
        let entries = run(WalkScanner::new(tmp.path())).await.unwrap();
        assert!(entries.iter().all(|e| !e.path.contains(".git")));
        assert!(entries.iter().any(|e| e.name == "index.js"));
    }

    #[tokio::test]
    async fn missing_root_fails_scanner() {
        let tmp = TempDir::new().unwrap();
        let (sink, scan) = ScanResult::channel(8);
        let scanner = WalkScanner::new(tmp.path().join("nope"));
        let result = scanner.scan(sink).await;
        assert!(matches!(result, Err(LocateError::Scanner(_))));
        assert!(matches!(
            scan.collect().await,
            Err(LocateError::ScanIncomplete { received: 0, .. })
        ));
    }
}
