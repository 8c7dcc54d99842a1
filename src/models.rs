//! Core data models exchanged between the scanner, the index store, and the
//! query engine.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LocateError, Result};

/// Kind of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file" => Some(EntryKind::File),
            "directory" => Some(EntryKind::Directory),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filesystem object's indexed metadata.
///
/// `path` is the primary key. `name` is the final path component, stored
/// denormalized so name queries never parse paths. Directories always carry
/// `size == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// Last modification time, Unix seconds.
    pub modified_at: i64,
    pub kind: EntryKind,
}

impl EntryRecord {
    /// Builds a record, deriving `name` from `path`.
    pub fn new(
        path: impl Into<String>,
        size: u64,
        modified_at: i64,
        kind: EntryKind,
    ) -> Result<Self> {
        EntryRecord {
            path: path.into(),
            name: String::new(),
            size,
            modified_at,
            kind,
        }
        .normalized()
    }

    pub fn file(path: impl Into<String>, size: u64, modified_at: i64) -> Result<Self> {
        Self::new(path, size, modified_at, EntryKind::File)
    }

    pub fn directory(path: impl Into<String>, modified_at: i64) -> Result<Self> {
        Self::new(path, 0, modified_at, EntryKind::Directory)
    }

    /// Enforces the record invariants on a record that came from outside the
    /// crate (e.g. a JSON-lines scanner).
    ///
    /// `path` must be absolute and end in a real component (or be a
    /// filesystem root). An empty `name` is derived from `path`; a non-empty
    /// one must equal the final path component. Directory sizes are forced
    /// to zero.
    pub fn normalized(mut self) -> Result<Self> {
        if self.path.is_empty() {
            return Err(LocateError::InvalidEntry("empty path".to_string()));
        }
        if !Path::new(&self.path).is_absolute() {
            return Err(LocateError::InvalidEntry(format!(
                "path is not absolute: {}",
                self.path
            )));
        }
        let derived = name_for_path(&self.path).ok_or_else(|| {
            LocateError::InvalidEntry(format!("path has no final component: {}", self.path))
        })?;
        if self.name.is_empty() {
            self.name = derived;
        } else if self.name != derived {
            return Err(LocateError::InvalidEntry(format!(
                "name '{}' does not match final component of '{}'",
                self.name, self.path
            )));
        }
        if self.kind == EntryKind::Directory {
            self.size = 0;
        }
        Ok(self)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn modified_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.modified_at, 0)
    }
}

impl fmt::Display for EntryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.path)
    }
}

/// Final component of `path`. A filesystem root is its own name; any other
/// path without a final component (one ending in `..`) has none.
pub fn name_for_path(path: &str) -> Option<String> {
    let p = Path::new(path);
    match p.file_name() {
        Some(name) => Some(name.to_string_lossy().to_string()),
        None if p.parent().is_none() => Some(path.to_string()),
        None => None,
    }
}

/// The single case-folding rule used for case-insensitive name matching,
/// applied both when rows are written and when patterns are compiled.
pub fn fold_case(value: &str) -> String {
    value.to_uppercase()
}

/// Counts produced by one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub unchanged: u64,
}

impl ReconcileSummary {
    /// Number of rows the run had to write.
    pub fn writes(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }

    /// Size of the index snapshot after the run.
    pub fn resulting_entries(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_final_component() {
        let e = EntryRecord::file("/a/report.txt", 120, 1).unwrap();
        assert_eq!(e.name, "report.txt");

        let d = EntryRecord::directory("/a/reports/", 2).unwrap();
        assert_eq!(d.name, "reports");
        assert_eq!(d.size, 0);
    }

    #[test]
    fn root_is_its_own_name() {
        assert_eq!(name_for_path("/").as_deref(), Some("/"));
        assert_eq!(EntryRecord::directory("/", 0).unwrap().name, "/");
    }

    #[test]
    fn directory_size_forced_to_zero() {
        let d = EntryRecord::new("/var/log", 4096, 0, EntryKind::Directory).unwrap();
        assert_eq!(d.size, 0);
    }

    #[test]
    fn mismatched_name_rejected() {
        let e = EntryRecord {
            path: "/a/b.txt".to_string(),
            name: "c.txt".to_string(),
            size: 1,
            modified_at: 0,
            kind: EntryKind::File,
        };
        assert!(matches!(e.normalized(), Err(LocateError::InvalidEntry(_))));
    }

    #[test]
    fn empty_path_rejected() {
        assert!(EntryRecord::file("", 0, 0).is_err());
    }

    #[test]
    fn relative_path_rejected() {
        assert!(matches!(
            EntryRecord::file("relative/x.txt", 1, 1),
            Err(LocateError::InvalidEntry(_))
        ));
        assert!(matches!(
            EntryRecord::directory("./here", 1),
            Err(LocateError::InvalidEntry(_))
        ));
    }

    #[test]
    fn parent_reference_has_no_name() {
        assert_eq!(name_for_path("/a/.."), None);
        assert!(matches!(
            EntryRecord::file("/a/..", 1, 1),
            Err(LocateError::InvalidEntry(_))
        ));
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [EntryKind::File, EntryKind::Directory] {
            assert_eq!(EntryKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntryKind::parse("symlink"), None);
    }

    #[test]
    fn fold_case_is_uppercase() {
        assert_eq!(fold_case("Report.txt"), "REPORT.TXT");
        assert_eq!(fold_case("straße"), "STRASSE");
    }

    #[test]
    fn display_matches_cli_listing() {
        let e = EntryRecord::file("/a/report.txt", 120, 1).unwrap();
        assert_eq!(e.to_string(), "file: /a/report.txt");
    }
}
