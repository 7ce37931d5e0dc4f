use std::collections::HashMap;

use crate::types::{GroupedEntry, ListEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Root,
    Node(usize),
}

/// Arranges `entries` into a directory tree under a synthetic `topLevel` root.
///
/// Each entry becomes a child of the directory entry whose segment path
/// (`directories ++ [name]`) equals its own `directories`. When no such
/// directory is present the entry attaches to the root. Children keep the
/// order of `entries`.
pub fn group(entries: Vec<ListEntry>) -> GroupedEntry {
    let mut directory_index: HashMap<Vec<String>, usize> = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        if entry.is_directory {
            let mut path = entry.directories.clone();
            path.push(entry.name.clone());
            directory_index.entry(path).or_insert(idx);
        }
    }

    let parents: Vec<Parent> = entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| match directory_index.get(&entry.directories) {
            Some(&parent) if parent != idx => Parent::Node(parent),
            _ => Parent::Root,
        })
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
    let mut roots = Vec::new();
    for (idx, parent) in parents.iter().enumerate() {
        match parent {
            Parent::Root => roots.push(idx),
            Parent::Node(parent) => children[*parent].push(idx),
        }
    }

    let mut slots: Vec<Option<ListEntry>> = entries.into_iter().map(Some).collect();
    let children = roots
        .into_iter()
        .filter_map(|idx| build(idx, &children, &mut slots))
        .collect();

    GroupedEntry {
        entry: ListEntry::top_level(),
        children,
    }
}

fn build(
    idx: usize,
    children: &[Vec<usize>],
    slots: &mut [Option<ListEntry>],
) -> Option<GroupedEntry> {
    let entry = slots[idx].take()?;
    let nested = children[idx]
        .iter()
        .filter_map(|&child| build(child, children, slots))
        .collect();
    Some(GroupedEntry {
        entry,
        children: nested,
    })
}
