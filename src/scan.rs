//! Scanner contract.
//!
//! A scanner produces a Scan Result: a stream of [`EntryRecord`]s followed by
//! an explicit [`ScanMessage::Complete`]. The reconciler only accepts a
//! result whose completion signal arrived; a stream that simply stops (the
//! scanner crashed, the pipe closed, the sender was dropped) is rejected with
//! [`LocateError::ScanIncomplete`] and nothing is written.
//!
//! ```text
//!  Scanner ──ScanSender──▶ bounded mpsc ──ScanResult──▶ reconcile()
//!           Entry, Entry, …, Complete
//! ```
//!
//! The channel is bounded, so a fast walker cannot outrun the reconciler's
//! memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{LocateError, Result};
use crate::models::EntryRecord;

/// One item on the scanner → reconciler stream.
///
/// Serialized form (one JSON object per line for external scanners):
///
/// ```text
/// {"type":"entry","path":"/a/report.txt","size":120,"modified_at":1700000000,"kind":"file"}
/// {"type":"complete"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanMessage {
    Entry(EntryRecord),
    Complete,
}

/// Producer half of a scan.
///
/// Dropping it without calling [`complete`](ScanSender::complete) marks the
/// scan as interrupted.
pub struct ScanSender {
    tx: mpsc::Sender<ScanMessage>,
    sent: u64,
}

impl ScanSender {
    pub async fn send(&mut self, entry: EntryRecord) -> Result<()> {
        self.tx
            .send(ScanMessage::Entry(entry))
            .await
            .map_err(|_| receiver_gone())?;
        self.sent += 1;
        Ok(())
    }

    /// Blocking variant for scanners running on a blocking thread.
    pub fn blocking_send(&mut self, entry: EntryRecord) -> Result<()> {
        self.tx
            .blocking_send(ScanMessage::Entry(entry))
            .map_err(|_| receiver_gone())?;
        self.sent += 1;
        Ok(())
    }

    /// Signals that the scan covered the whole tree.
    pub async fn complete(self) -> Result<()> {
        self.tx
            .send(ScanMessage::Complete)
            .await
            .map_err(|_| receiver_gone())
    }

    pub fn blocking_complete(self) -> Result<()> {
        self.tx
            .blocking_send(ScanMessage::Complete)
            .map_err(|_| receiver_gone())
    }

    /// Entries sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

fn receiver_gone() -> LocateError {
    LocateError::Scanner("reconciler stopped consuming the scan".to_string())
}

/// Consumer half of a scan.
pub struct ScanResult {
    rx: mpsc::Receiver<ScanMessage>,
}

impl ScanResult {
    /// A bounded scan channel holding at most `capacity` in-flight messages.
    pub fn channel(capacity: usize) -> (ScanSender, ScanResult) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ScanSender { tx, sent: 0 }, ScanResult { rx })
    }

    /// A completed scan over `entries`.
    pub fn from_entries(entries: Vec<EntryRecord>) -> ScanResult {
        let mut messages: Vec<ScanMessage> = entries.into_iter().map(ScanMessage::Entry).collect();
        messages.push(ScanMessage::Complete);
        Self::from_messages(messages)
    }

    /// A scan replaying `messages` verbatim, then closing. Without a
    /// trailing [`ScanMessage::Complete`] this is an interrupted scan.
    pub fn from_messages(messages: Vec<ScanMessage>) -> ScanResult {
        let (tx, rx) = mpsc::channel(messages.len().max(1));
        for message in messages {
            // Capacity covers every message
            let _ = tx.try_send(message);
        }
        ScanResult { rx }
    }

    /// Drains the stream into a path-keyed map.
    ///
    /// Fails with `ScanIncomplete` when the stream closes before the
    /// completion signal. Later duplicates of a path replace earlier ones.
    pub(crate) async fn collect(mut self) -> Result<HashMap<String, EntryRecord>> {
        let mut entries = HashMap::new();
        let mut received = 0u64;

        while let Some(message) = self.rx.recv().await {
            match message {
                ScanMessage::Entry(entry) => {
                    let entry = entry.normalized()?;
                    received += 1;
                    entries.insert(entry.path.clone(), entry);
                }
                ScanMessage::Complete => return Ok(entries),
            }
        }

        warn!(received, "scan stream closed without completion signal");
        Err(LocateError::ScanIncomplete {
            received,
            cause: None,
        })
    }
}

/// A filesystem scanner feeding the reconciler.
///
/// Implementations send every entry through `sink` and finish with
/// [`ScanSender::complete`]. Returning early, with or without an error,
/// leaves the scan incomplete.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Label recorded in the reconciliation history (e.g. `walk:/home`).
    fn name(&self) -> String;

    async fn scan(&self, sink: ScanSender) -> Result<()>;
}
