//! # locatex
//!
//! A `locate`-style file index: a persistent table of filesystem metadata
//! that is reconciled against full scans and queried by name.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  ScanMessage  ┌─────────────┐  upsert / delete  ┌──────────┐
//! │  Scanners   │──────────────▶│  Reconcile  │──────────────────▶│  SQLite  │
//! │ walk/jsonl  │   (bounded)   │ (lock held) │                   │  (WAL)   │
//! └─────────────┘               └─────────────┘                   └────┬─────┘
//!                                                                      │
//!                               ┌─────────────┐   prefiltered rows     │
//!                               │    Query    │◀───────────────────────┘
//!                               │ substr/regex│
//!                               └──────┬──────┘
//!                                      ▼
//!                               ┌─────────────┐
//!                               │   Cursor    │──▶ pages
//!                               └─────────────┘
//! ```
//!
//! Readers see the last committed snapshot while a reconciliation runs.
//! Each batch of writes commits atomically, and only one reconciliation may
//! run against an index at a time.
//!
//! ## Quick Start
//!
//! ```bash
//! locatex init                       # create the index
//! locatex update --root ~/src        # walk and reconcile
//! locatex search report              # substring match on names
//! locatex search '^main\.rs$' --regex
//! find / -printf ... | my-scanner | locatex ingest -
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Entry records and reconcile summaries |
//! | [`store`] | Persistent index store |
//! | [`scan`] | Scanner contract and scan results |
//! | [`scanner_walk`] | Directory-walking scanner |
//! | [`scanner_jsonl`] | JSON-lines scanner for external producers |
//! | [`reconcile`] | Diff a scan against the index and apply it |
//! | [`query`] | Substring, prefix, and regex queries |
//! | [`cursor`] | Pagination over query results |
//! | [`lock`] | Single-writer lock file |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod ingest;
pub mod lock;
pub mod migrate;
pub mod models;
pub mod query;
pub mod reconcile;
pub mod scan;
pub mod scanner_jsonl;
pub mod scanner_walk;
pub mod search;
pub mod stats;
pub mod store;

pub use cursor::{Page, PaginationCursor};
pub use error::{LocateError, Result};
pub use models::{EntryKind, EntryRecord, ReconcileSummary};
pub use query::{search, MatchField, MatchMode, MatchSequence, Query};
pub use reconcile::{reconcile, reconcile_from};
pub use scan::{ScanMessage, ScanResult, ScanSender, Scanner};
pub use store::IndexStore;
