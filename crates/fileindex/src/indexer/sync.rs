//! Periodic scan → diff → replace loop.
//!
//! Each cycle walks the tree, reuses cached entries whose modification time
//! did not change (so only changed files are sniffed), keeps the cached subtree
//! of any directory the walk could not list, and publishes the result only
//! when something actually changed.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::sniff::{sniff_path, ContentSniffer};
use super::walk::{DirectoryScanner, SkippedDir};
use crate::error::{IndexError, Result};
use crate::store::{CacheStore, EntryMap, Snapshot};

/// Default pause between the end of one cycle and the start of the next.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Entries produced by the walk.
    pub scanned: usize,
    /// Entries that were new or had a different modification time.
    pub changed: usize,
    /// Cached entries kept because their directory could not be listed.
    pub carried_over: usize,
    pub skipped_dirs: usize,
    /// Whether a new snapshot was published.
    pub replaced: bool,
    /// Store cycle after this run.
    pub cycle: u64,
    /// Store size after this run.
    pub total: usize,
    pub elapsed: Duration,
}

/// Drives a [`DirectoryScanner`] and commits its results to a [`CacheStore`].
pub struct SyncScheduler {
    store: Arc<CacheStore>,
    scanner: DirectoryScanner,
    sniffer: Arc<dyn ContentSniffer>,
    config: SyncConfig,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("root", &self.scanner.root())
            .field("config", &self.config)
            .finish()
    }
}

impl SyncScheduler {
    pub fn new(
        store: Arc<CacheStore>,
        scanner: DirectoryScanner,
        sniffer: Arc<dyn ContentSniffer>,
    ) -> Self {
        Self {
            store,
            scanner,
            sniffer,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Runs one scan-diff-replace cycle synchronously.
    pub fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();
        let previous = self.store.snapshot();

        let mut stream = self.scanner.scan()?;
        let mut items = EntryMap::new();
        let mut changed = 0usize;

        for mut entry in stream.by_ref() {
            let key = entry.key();
            match previous.get(&key) {
                Some(cached) if cached.modified_at == entry.modified_at => {
                    items.insert(key, cached.clone());
                }
                _ => {
                    changed += 1;
                    if !entry.is_directory {
                        entry.content_type =
                            sniff_path(self.sniffer.as_ref(), &entry.absolute_path());
                    }
                    items.insert(key, Arc::new(entry));
                }
            }
        }
        let summary = stream.finish()?;
        let scanned = items.len();
        let carried_over = carry_over_skipped(&previous, &summary.skipped, &mut items);

        let replaced = changed > 0 || items.len() != previous.len();
        let cycle = if replaced {
            self.store.replace(items)
        } else {
            previous.cycle()
        };

        let report = CycleReport {
            scanned,
            changed,
            carried_over,
            skipped_dirs: summary.skipped.len(),
            replaced,
            cycle,
            total: self.store.len(),
            elapsed: started.elapsed(),
        };

        if replaced {
            log::info!(
                "fileindex sync published root={} cycle={} total={} scanned={} changed={} carried_over={} skipped_dirs={} elapsed_ms={}",
                self.scanner.root().display(),
                report.cycle,
                report.total,
                report.scanned,
                report.changed,
                report.carried_over,
                report.skipped_dirs,
                report.elapsed.as_millis(),
            );
        } else {
            log::debug!(
                "fileindex sync unchanged root={} cycle={} total={} elapsed_ms={}",
                self.scanner.root().display(),
                report.cycle,
                report.total,
                report.elapsed.as_millis(),
            );
        }

        Ok(report)
    }

    /// Moves the scheduler onto a background thread that runs a cycle, sleeps
    /// the configured interval, and repeats until the handle is shut down.
    pub fn spawn(self) -> Result<SyncHandle> {
        self.spawn_loop(true)
    }

    /// Like [`SyncScheduler::spawn`], but sleeps one interval (or until a
    /// sync is requested) before the first cycle. Use this after priming the
    /// store with [`SyncScheduler::run_cycle`].
    pub fn spawn_deferred(self) -> Result<SyncHandle> {
        self.spawn_loop(false)
    }

    fn spawn_loop(self, run_first: bool) -> Result<SyncHandle> {
        let signal = Arc::new(SyncSignal::default());
        let signal_for_thread = signal.clone();
        let interval = self.config.interval;

        let join_handle = thread::Builder::new()
            .name("fileindex-sync".to_string())
            .spawn(move || {
                if !run_first
                    && signal_for_thread.wait_for_next_cycle(interval) == SyncDecision::Shutdown
                {
                    return;
                }
                loop {
                    if let Err(error) = self.run_cycle() {
                        log::warn!(
                            "fileindex sync cycle failed root={} error={}",
                            self.scanner.root().display(),
                            error
                        );
                    }
                    match signal_for_thread.wait_for_next_cycle(interval) {
                        SyncDecision::Shutdown => break,
                        SyncDecision::Run => {}
                    }
                }
            })
            .map_err(IndexError::Io)?;

        Ok(SyncHandle {
            signal,
            join_handle: Some(join_handle),
        })
    }
}

/// Copies cached entries below each skipped directory into `items`, so an
/// unreadable directory never reads as a deletion. Returns how many were kept.
fn carry_over_skipped(previous: &Snapshot, skipped: &[SkippedDir], items: &mut EntryMap) -> usize {
    let mut carried = 0;
    for dir in skipped {
        let prefix = dir.relative_prefix.as_str();
        for (key, entry) in previous
            .entries()
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            if !items.contains_key(key) {
                items.insert(key.clone(), entry.clone());
                carried += 1;
            }
        }
    }
    carried
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncDecision {
    Run,
    Shutdown,
}

#[derive(Debug, Default)]
struct SignalState {
    shutdown: bool,
    requested: bool,
}

/// Wakes the sync thread early or tells it to stop.
#[derive(Debug, Default)]
struct SyncSignal {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl SyncSignal {
    fn wait_for_next_cycle(&self, interval: Duration) -> SyncDecision {
        let deadline = Instant::now() + interval;
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return SyncDecision::Shutdown;
            }
            if state.requested {
                state.requested = false;
                return SyncDecision::Run;
            }
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                return if state.shutdown {
                    SyncDecision::Shutdown
                } else {
                    SyncDecision::Run
                };
            }
        }
    }

    fn request(&self) {
        self.state.lock().requested = true;
        self.condvar.notify_all();
    }

    fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.condvar.notify_all();
    }
}

/// Owns the background sync thread. Dropping it stops the loop after the
/// current cycle and joins the thread.
#[derive(Debug)]
pub struct SyncHandle {
    signal: Arc<SyncSignal>,
    join_handle: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Cuts the current sleep short so the next cycle starts right away.
    pub fn request_sync(&self) {
        self.signal.request();
    }

    /// Returns a cloneable handle that can only request syncs.
    pub fn trigger(&self) -> SyncTrigger {
        SyncTrigger {
            signal: self.signal.clone(),
        }
    }

    /// Stops the loop and waits for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.signal.shutdown();
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                log::warn!("fileindex sync thread panicked");
            }
        }
    }
}

/// Requests early sync cycles without owning the thread.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    signal: Arc<SyncSignal>,
}

impl SyncTrigger {
    pub fn request_sync(&self) {
        self.signal.request();
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::sniff::MagicSniffer;
    use crate::indexer::walk::DenyLister;
    use std::fs::{self, File};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts how often it is asked to sniff.
    #[derive(Default)]
    struct CountingSniffer {
        calls: AtomicUsize,
    }

    impl ContentSniffer for CountingSniffer {
        fn detect(&self, head: &[u8], name: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            MagicSniffer.detect(head, name)
        }
    }

    fn scheduler(root: &std::path::Path) -> (SyncScheduler, Arc<CountingSniffer>) {
        let sniffer = Arc::new(CountingSniffer::default());
        let scheduler = SyncScheduler::new(
            Arc::new(CacheStore::new()),
            DirectoryScanner::new(root),
            sniffer.clone(),
        );
        (scheduler, sniffer)
    }

    fn set_mtime(path: &std::path::Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(std::time::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn first_cycle_publishes_and_sniffs_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/x.txt"), "hello").unwrap();

        let (scheduler, sniffer) = scheduler(temp.path());
        let report = scheduler.run_cycle().unwrap();

        assert!(report.replaced);
        assert_eq!(report.scanned, 2);
        assert_eq!(report.changed, 2);
        assert_eq!(sniffer.calls.load(Ordering::SeqCst), 1);

        let store = scheduler.store();
        assert_eq!(store.cycle(), report.cycle);
        assert_eq!(store.get("/a").unwrap().content_type, "");
        assert_eq!(
            store.get("/a/x.txt").unwrap().content_type,
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn unchanged_tree_is_a_noop_cycle() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("x.txt"), "hello").unwrap();

        let (scheduler, sniffer) = scheduler(temp.path());
        let first = scheduler.run_cycle().unwrap();
        let before = scheduler.store().snapshot();
        let second = scheduler.run_cycle().unwrap();
        let after = scheduler.store().snapshot();

        assert!(!second.replaced);
        assert_eq!(second.changed, 0);
        assert_eq!(first.cycle, second.cycle);
        assert_eq!(sniffer.calls.load(Ordering::SeqCst), 1);
        let keys = |snapshot: &Snapshot| snapshot.entries().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys(&before), keys(&after));
        assert_eq!(
            before.get("/x.txt").unwrap().content_type,
            after.get("/x.txt").unwrap().content_type
        );
    }

    #[test]
    fn modified_file_is_resniffed_and_published() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob");
        fs::write(&path, "hello").unwrap();
        set_mtime(&path, 1_000);

        let (scheduler, sniffer) = scheduler(temp.path());
        let first = scheduler.run_cycle().unwrap();
        assert_eq!(
            scheduler.store().get("/blob").unwrap().content_type,
            "text/plain; charset=utf-8"
        );

        fs::write(&path, b"\x00\x01binary").unwrap();
        set_mtime(&path, 2_000);
        let second = scheduler.run_cycle().unwrap();

        assert!(second.replaced);
        assert_eq!(second.changed, 1);
        assert!(second.cycle > first.cycle);
        assert_eq!(sniffer.calls.load(Ordering::SeqCst), 2);
        let entry = scheduler.store().get("/blob").unwrap();
        assert_eq!(entry.modified_at, 2_000);
        assert_eq!(entry.content_type, "application/octet-stream");
    }

    #[test]
    fn deletion_changes_count_and_publishes() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("keep.txt"), "a").unwrap();
        fs::write(temp.path().join("gone.txt"), "b").unwrap();

        let (scheduler, _) = scheduler(temp.path());
        scheduler.run_cycle().unwrap();
        fs::remove_file(temp.path().join("gone.txt")).unwrap();
        let report = scheduler.run_cycle().unwrap();

        assert!(report.replaced);
        assert_eq!(report.changed, 0);
        assert_eq!(report.total, 1);
        assert!(scheduler.store().get("/gone.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn unreadable_root_keeps_previous_snapshot() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("x.txt"), "a").unwrap();

        let (scheduler, _) = scheduler(&root);
        let first = scheduler.run_cycle().unwrap();
        fs::remove_dir_all(&root).unwrap();
        let second = scheduler.run_cycle().unwrap();

        assert_eq!(second.skipped_dirs, 1);
        assert_eq!(second.carried_over, 1);
        assert!(!second.replaced);
        assert_eq!(second.cycle, first.cycle);
        assert!(scheduler.store().get("/x.txt").is_ok());
    }

    #[test]
    fn denied_subdirectory_keeps_its_cached_entries() {
        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("inner.txt"), "a").unwrap();
        fs::write(temp.path().join("open.txt"), "b").unwrap();

        let store = Arc::new(CacheStore::new());
        let open = SyncScheduler::new(
            store.clone(),
            DirectoryScanner::new(temp.path()),
            Arc::new(MagicSniffer),
        );
        let first = open.run_cycle().unwrap();
        assert_eq!(first.total, 3);

        let denied = SyncScheduler::new(
            store.clone(),
            DirectoryScanner::new(temp.path())
                .with_lister(Arc::new(DenyLister::new([&locked]))),
            Arc::new(MagicSniffer),
        );
        fs::write(temp.path().join("new.txt"), "c").unwrap();
        let second = denied.run_cycle().unwrap();

        assert_eq!(second.skipped_dirs, 1);
        assert_eq!(second.carried_over, 1);
        assert!(second.replaced);
        assert_eq!(second.total, 4);
        assert!(store.get("/locked").is_ok());
        assert!(store.get("/locked/inner.txt").is_ok());
        assert!(store.get("/new.txt").is_ok());

        // Once the directory lists again, removals inside it are real.
        fs::remove_file(locked.join("inner.txt")).unwrap();
        let third = open.run_cycle().unwrap();
        assert_eq!(third.skipped_dirs, 0);
        assert_eq!(third.total, 3);
        assert!(store.get("/locked/inner.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn carry_over_only_touches_skipped_subtree() {
        let previous = Snapshot::from_entries(
            7,
            ["/locked/", "/locked/inner/", "/lockedness/", "/"]
                .iter()
                .enumerate()
                .map(|(i, dir)| crate::types::Entry {
                    name: format!("f{i}.txt"),
                    size: 0,
                    absolute_dir: std::path::PathBuf::from("/srv"),
                    relative_path: dir.to_string(),
                    is_directory: false,
                    modified_at: 0,
                    content_type: String::new(),
                }),
        );
        let skipped = vec![SkippedDir {
            path: "/srv/locked".into(),
            relative_prefix: "/locked/".to_string(),
            error: "denied".to_string(),
        }];
        let mut items = EntryMap::new();
        let carried = carry_over_skipped(&previous, &skipped, &mut items);

        assert_eq!(carried, 2);
        let keys: Vec<_> = items.keys().cloned().collect();
        assert_eq!(keys, vec!["/locked/f0.txt", "/locked/inner/f1.txt"]);
    }

    #[test]
    fn spawned_loop_publishes_and_shuts_down() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("x.txt"), "a").unwrap();

        let (scheduler, _) = scheduler(temp.path());
        let store = scheduler.store().clone();
        let handle = scheduler
            .with_config(SyncConfig {
                interval: Duration::from_millis(10),
            })
            .spawn()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(store.len(), 1);

        fs::write(temp.path().join("y.txt"), "b").unwrap();
        handle.trigger().request_sync();
        let deadline = Instant::now() + Duration::from_secs(5);
        while store.len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(store.len(), 2);

        handle.shutdown();
    }

    #[test]
    fn deferred_loop_waits_before_its_first_cycle() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("x.txt"), "a").unwrap();

        let (scheduler, sniffer) = scheduler(temp.path());
        let primed = scheduler.run_cycle().unwrap();
        let store = scheduler.store().clone();
        let handle = scheduler
            .with_config(SyncConfig {
                interval: Duration::from_secs(3600),
            })
            .spawn_deferred()
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(store.cycle(), primed.cycle);
        assert_eq!(sniffer.calls.load(Ordering::SeqCst), 1);

        fs::write(temp.path().join("y.txt"), "b").unwrap();
        handle.request_sync();
        let deadline = Instant::now() + Duration::from_secs(5);
        while store.len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(store.len(), 2);
        assert_eq!(sniffer.calls.load(Ordering::SeqCst), 2);

        handle.shutdown();
    }

    #[test]
    fn deferred_loop_shuts_down_without_scanning() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("x.txt"), "a").unwrap();

        let (scheduler, sniffer) = scheduler(temp.path());
        let store = scheduler.store().clone();
        let handle = scheduler
            .with_config(SyncConfig {
                interval: Duration::from_secs(3600),
            })
            .spawn_deferred()
            .unwrap();
        handle.shutdown();

        assert!(store.is_empty());
        assert_eq!(sniffer.calls.load(Ordering::SeqCst), 0);
    }
}
