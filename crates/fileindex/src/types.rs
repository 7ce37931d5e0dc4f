//! Entry types held by the cache and the projections built from them on read.

use std::path::PathBuf;

use serde::Serialize;

use crate::path::{cache_key, resource_url, split_path_segments};

/// Name of the synthetic root node produced by grouping.
pub const TOP_LEVEL_NAME: &str = "topLevel";

/// One filesystem object as held in the cache.
///
/// Entries are built wholesale by the scanner and never mutated once they are
/// published in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Base name.
    pub name: String,
    /// Size in bytes. Meaningless for directories.
    pub size: u64,
    /// Absolute path of the directory containing this entry.
    pub absolute_dir: PathBuf,
    /// Canonical directory below the index root, `/` or `/a/b/`.
    pub relative_path: String,
    pub is_directory: bool,
    /// Modification time, seconds since the Unix epoch.
    pub modified_at: i64,
    /// Sniffed media type. Empty for directories and undetectable files.
    pub content_type: String,
}

impl Entry {
    /// Returns the cache key (`relative_path + name`).
    pub fn key(&self) -> String {
        cache_key(&self.relative_path, &self.name)
    }

    /// Returns the absolute filesystem path of this entry.
    pub fn absolute_path(&self) -> PathBuf {
        self.absolute_dir.join(&self.name)
    }

    /// Returns the path segments from the root down to this entry's parent.
    pub fn directories(&self) -> Vec<String> {
        split_path_segments(&self.relative_path)
    }

    /// Builds the query-facing projection.
    pub fn to_list_entry(&self) -> ListEntry {
        let key = self.key();
        ListEntry {
            name: self.name.clone(),
            modified_at: self.modified_at,
            size: self.size,
            is_directory: self.is_directory,
            content_type: self.content_type.clone(),
            directories: self.directories(),
            detail_url: resource_url("detail", &key),
            content_url: resource_url("content", &key),
            video_url: resource_url("video", &key),
            view_url: resource_url("view", &key),
        }
    }
}

/// Query-facing projection of an [`Entry`]. Built per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    pub name: String,
    pub modified_at: i64,
    pub size: u64,
    pub is_directory: bool,
    pub content_type: String,
    pub directories: Vec<String>,
    pub detail_url: String,
    pub content_url: String,
    /// Handle for an HTML video player page. The `silo` server does not
    /// mount `/video`; the handle is kept for clients that host the page.
    pub video_url: String,
    /// Handle for an HTML viewer page. Not mounted by `silo` either.
    pub view_url: String,
}

impl ListEntry {
    /// The synthetic root used by grouping.
    pub fn top_level() -> Self {
        Self {
            name: TOP_LEVEL_NAME.to_string(),
            modified_at: 1,
            size: 1,
            is_directory: true,
            content_type: String::new(),
            directories: Vec::new(),
            detail_url: String::new(),
            content_url: String::new(),
            video_url: String::new(),
            view_url: String::new(),
        }
    }
}

/// A [`ListEntry`] with its children, forming a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedEntry {
    #[serde(flatten)]
    pub entry: ListEntry,
    pub children: Vec<GroupedEntry>,
}

impl GroupedEntry {
    pub fn leaf(entry: ListEntry) -> Self {
        Self {
            entry,
            children: Vec::new(),
        }
    }

    /// Flattens the tree in pre-order, skipping this node itself.
    pub fn descendants(&self) -> Vec<&ListEntry> {
        let mut out = Vec::new();
        let mut stack: Vec<&GroupedEntry> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(&node.entry);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}
