//! Building and refreshing the cache.
//!
//! - Walking the tree on a producer thread
//! - Sniffing content types of changed files
//! - The periodic scan, diff and replace cycle

mod sniff;
mod sync;
mod walk;

pub use sniff::{sniff_path, ContentSniffer, MagicSniffer, SNIFF_LEN};
pub use sync::{
    CycleReport, SyncConfig, SyncHandle, SyncScheduler, SyncTrigger, DEFAULT_SYNC_INTERVAL,
};
pub use walk::{
    unix_secs, DenyLister, DirectoryLister, DirectoryScanner, FsLister, ScanConfig, ScanStream,
    ScanSummary, SkippedDir, DEFAULT_CHANNEL_CAPACITY,
};
