//! One-shot depth-first directory walk.
//!
//! The walk runs on its own producer thread and hands entries to the caller
//! through a bounded channel. The caller sees a finite iterator of [`Entry`]
//! values; the last message on the channel is an explicit [`ScanSummary`], so
//! completion never depends on the channel merely closing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::{canonicalize_existing_path, IndexError, Result};
use crate::path::relative_dir;
use crate::types::Entry;

/// Default capacity of the producer → consumer handoff.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Scanner tuning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Entries buffered between the walking thread and the consumer.
    pub channel_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// A directory that could not be listed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDir {
    /// Absolute path of the directory.
    pub path: PathBuf,
    /// Canonical relative directory of its children, e.g. `/a/b/` (`/` for the root).
    pub relative_prefix: String,
    pub error: String,
}

/// Completion record delivered after the last entry.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub files: usize,
    pub dirs: usize,
    /// Entries dropped because their metadata could not be read.
    pub unreadable_entries: usize,
    pub skipped: Vec<SkippedDir>,
    pub elapsed: Duration,
}

impl ScanSummary {
    pub fn entries(&self) -> usize {
        self.files + self.dirs
    }
}

/// Lists the children of one directory during a walk.
///
/// The default [`FsLister`] reads the real filesystem. Other implementations
/// can refuse specific directories so skipped-directory handling can be
/// exercised without relying on permission bits.
pub trait DirectoryLister: Send + Sync {
    fn read_dir(&self, dir: &Path) -> io::Result<fs::ReadDir>;
}

/// Plain [`fs::read_dir`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLister;

impl DirectoryLister for FsLister {
    fn read_dir(&self, dir: &Path) -> io::Result<fs::ReadDir> {
        fs::read_dir(dir)
    }
}

/// Fails with `PermissionDenied` for the listed directories and reads every
/// other one from the filesystem.
#[derive(Debug, Clone, Default)]
pub struct DenyLister {
    denied: Vec<PathBuf>,
}

impl DenyLister {
    pub fn new(denied: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            denied: denied
                .into_iter()
                .map(|path| canonicalize_existing_path(path.into()))
                .collect(),
        }
    }
}

impl DirectoryLister for DenyLister {
    fn read_dir(&self, dir: &Path) -> io::Result<fs::ReadDir> {
        if self.denied.iter().any(|denied| denied == dir) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("listing denied: {}", dir.display()),
            ));
        }
        fs::read_dir(dir)
    }
}

enum ScanMessage {
    Entry(Entry),
    Done(ScanSummary),
}

/// Walks a rooted directory tree and produces one [`Entry`] per file or directory.
#[derive(Clone)]
pub struct DirectoryScanner {
    root: PathBuf,
    config: ScanConfig,
    lister: Arc<dyn DirectoryLister>,
}

impl std::fmt::Debug for DirectoryScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryScanner")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DirectoryScanner {
    /// Creates a scanner for `root`. The root is made absolute and canonical
    /// when it exists.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: canonicalize_existing_path(root.into()),
            config: ScanConfig::default(),
            lister: Arc::new(FsLister),
        }
    }

    /// Like [`DirectoryScanner::new`], but fails when `root` is not an
    /// existing directory.
    pub fn try_new(root: impl Into<PathBuf>) -> Result<Self> {
        let scanner = Self::new(root);
        if !scanner.root.is_dir() {
            return Err(IndexError::RootNotFound(scanner.root));
        }
        Ok(scanner)
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_lister(mut self, lister: Arc<dyn DirectoryLister>) -> Self {
        self.lister = lister;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a scan on a producer thread and returns the consuming end.
    ///
    /// Dropping the returned stream early stops the walk at its next send.
    pub fn scan(&self) -> Result<ScanStream> {
        let (sender, receiver) = sync_channel(self.config.channel_capacity.max(1));
        let root = self.root.clone();
        let lister = self.lister.clone();
        let handle = thread::Builder::new()
            .name("fileindex-scan".to_string())
            .spawn(move || {
                let started = Instant::now();
                let mut walker = Walker {
                    root: &root,
                    lister: lister.as_ref(),
                    sender: &sender,
                    summary: ScanSummary::default(),
                    disconnected: false,
                };
                walker.walk_dir(&root);
                if walker.disconnected {
                    return;
                }
                let mut summary = walker.summary;
                summary.elapsed = started.elapsed();
                let _ = sender.send(ScanMessage::Done(summary));
            })?;

        Ok(ScanStream {
            receiver,
            summary: None,
            handle: Some(handle),
        })
    }
}

/// Consuming end of a scan: a lazy, finite, non-restartable entry sequence.
pub struct ScanStream {
    receiver: Receiver<ScanMessage>,
    summary: Option<ScanSummary>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ScanStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanStream")
            .field("summary", &self.summary)
            .finish()
    }
}

impl Iterator for ScanStream {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        if self.summary.is_some() {
            return None;
        }
        match self.receiver.recv() {
            Ok(ScanMessage::Entry(entry)) => Some(entry),
            Ok(ScanMessage::Done(summary)) => {
                self.summary = Some(summary);
                None
            }
            Err(_) => None,
        }
    }
}

impl ScanStream {
    /// Drains whatever is left and returns the completion record.
    ///
    /// Fails if the producer stopped without delivering one.
    pub fn finish(mut self) -> Result<ScanSummary> {
        for _ in self.by_ref() {}
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| IndexError::Internal("scan thread panicked".to_string()))?;
        }
        self.summary.take().ok_or_else(|| {
            IndexError::Internal("scan ended without a completion record".to_string())
        })
    }
}

struct Walker<'a> {
    root: &'a Path,
    lister: &'a dyn DirectoryLister,
    sender: &'a SyncSender<ScanMessage>,
    summary: ScanSummary,
    disconnected: bool,
}

impl Walker<'_> {
    fn walk_dir(&mut self, dir: &Path) {
        let relative_path = relative_dir(self.root, dir).unwrap_or_else(|| "/".to_string());

        let read_dir = match self.lister.read_dir(dir) {
            Ok(iter) => iter,
            Err(error) => {
                log::warn!(
                    "fileindex scan skipped directory path={} error={}",
                    dir.display(),
                    error
                );
                self.summary.skipped.push(SkippedDir {
                    path: dir.to_path_buf(),
                    relative_prefix: relative_path,
                    error: error.to_string(),
                });
                return;
            }
        };

        let mut children = Vec::new();
        for item in read_dir {
            match item {
                Ok(item) => children.push(item),
                Err(error) => {
                    self.summary.unreadable_entries += 1;
                    log::warn!(
                        "fileindex scan unreadable entry dir={} error={}",
                        dir.display(),
                        error
                    );
                }
            }
        }
        children.sort_unstable_by_key(|child| child.file_name());

        for child in children {
            if self.disconnected {
                return;
            }

            // Keys, URLs and JSON are UTF-8; other names cannot be served.
            let name = match child.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    self.summary.unreadable_entries += 1;
                    log::warn!(
                        "fileindex scan skipped non-utf8 name dir={} name={:?}",
                        dir.display(),
                        raw
                    );
                    continue;
                }
            };
            // DirEntry::metadata does not follow symlinks, so links never recurse.
            let metadata = match child.metadata() {
                Ok(metadata) => metadata,
                Err(error) => {
                    self.summary.unreadable_entries += 1;
                    log::warn!(
                        "fileindex scan unreadable entry path={} error={}",
                        child.path().display(),
                        error
                    );
                    continue;
                }
            };
            let is_directory = metadata.is_dir();
            if is_directory {
                self.summary.dirs += 1;
            } else {
                self.summary.files += 1;
            }

            let entry = Entry {
                name,
                size: metadata.len(),
                absolute_dir: dir.to_path_buf(),
                relative_path: relative_path.clone(),
                is_directory,
                modified_at: metadata.modified().map(unix_secs).unwrap_or(0),
                content_type: String::new(),
            };
            if self.sender.send(ScanMessage::Entry(entry)).is_err() {
                self.disconnected = true;
                return;
            }

            if is_directory {
                self.walk_dir(&child.path());
            }
        }
    }
}

/// Converts a timestamp to whole seconds since the Unix epoch (negative before it).
pub fn unix_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_secs()).unwrap_or(i64::MAX),
    }
}
