//! In-memory index of a directory tree.
//!
//! This crate provides:
//! - A snapshot cache swapped atomically once per sync cycle
//! - A background scanner that re-sniffs only changed files
//! - Filter, sort and pagination queries over the current snapshot
//! - Grouping of query results into a directory tree

pub mod error;
pub mod indexer;
pub mod path;
pub mod query;
pub mod store;
pub mod types;

// Re-export main types
pub use error::{IndexError, Result};
pub use indexer::{
    ContentSniffer, CycleReport, DenyLister, DirectoryLister, DirectoryScanner, MagicSniffer,
    ScanConfig, ScanSummary, SyncConfig, SyncHandle, SyncScheduler, SyncTrigger,
};
pub use query::{group, query, QueryOutcome, QueryParams, SortMode};
pub use store::{CacheStore, EntryMap, Snapshot};
pub use types::{Entry, GroupedEntry, ListEntry};
