//! Error taxonomy for the index core.
//!
//! Every fallible operation in the store, reconciliation, query, and cursor
//! layers returns [`LocateError`]. The CLI wraps these in `anyhow` for
//! display; nothing in the core aborts the process.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocateError {
    /// The backing store could not be opened, created, or read.
    #[error("index storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A write transaction could not commit. The transaction was rolled back
    /// and the index is in its pre-operation state.
    #[error("index write failed and was rolled back: {0}")]
    StorageWriteFailed(#[source] sqlx::Error),

    /// The scanner's stream ended without a completion signal. `cause` holds
    /// the scanner's own error when it failed mid-stream.
    #[error(
        "scan ended without a completion signal after {received} entries{}; index left unchanged",
        cause_suffix(.cause)
    )]
    ScanIncomplete {
        received: u64,
        cause: Option<String>,
    },

    /// Another reconciliation holds the writer lock.
    #[error("a reconciliation is already in progress (lock held on {})", .0.display())]
    ReconciliationInProgress(PathBuf),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("page size must be positive, got {0}")]
    InvalidPageSize(i64),

    /// A scanner produced a record that violates the entry invariants.
    #[error("invalid entry record: {0}")]
    InvalidEntry(String),

    /// The scanner collaborator itself failed (unreadable root, bad stream).
    #[error("scanner failed: {0}")]
    Scanner(String),
}

impl LocateError {
    pub(crate) fn unavailable(err: impl std::fmt::Display) -> Self {
        LocateError::StorageUnavailable(err.to_string())
    }

    /// Whether the caller should treat this as a warning rather than a failure.
    pub fn is_warning(&self) -> bool {
        matches!(self, LocateError::ScanIncomplete { .. })
    }
}

fn cause_suffix(cause: &Option<String>) -> String {
    match cause {
        Some(cause) => format!(" ({})", cause),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, LocateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_incomplete_is_warning_level() {
        assert!(LocateError::ScanIncomplete {
            received: 3,
            cause: None
        }
        .is_warning());
        assert!(!LocateError::InvalidPageSize(0).is_warning());
        assert!(!LocateError::ReconciliationInProgress(PathBuf::from("/tmp/x.lock")).is_warning());
    }

    #[test]
    fn messages_name_the_offending_value() {
        let msg = LocateError::InvalidPageSize(-4).to_string();
        assert!(msg.contains("-4"));

        let msg = LocateError::ScanIncomplete {
            received: 12,
            cause: None,
        }
        .to_string();
        assert!(msg.contains("12 entries"));

        let msg = LocateError::ScanIncomplete {
            received: 2,
            cause: Some("disk read error".to_string()),
        }
        .to_string();
        assert!(msg.contains("2 entries (disk read error)"));
    }
}
