use crate::query::params::{Pagination, QueryParams, SortMode};
use crate::store::Snapshot;
use crate::types::ListEntry;

/// Result of running [`query`] against one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    pub entries: Vec<ListEntry>,
    /// Count after filtering and before pagination.
    pub matched: usize,
    /// Cycle of the snapshot the query ran against.
    pub cycle: u64,
    pub pagination: Option<Pagination>,
}

impl QueryOutcome {
    pub fn returned(&self) -> usize {
        self.entries.len()
    }
}

/// Runs `params` against `snapshot`.
///
/// Stages run in a fixed order: base set, exclude, dirs, orderby, page, limit.
pub fn query(snapshot: &Snapshot, params: &QueryParams) -> QueryOutcome {
    let mut items = base_set(snapshot, params);

    if let Some(terms) = params.exclude.as_deref() {
        items.retain(|item| !contains_any(&item.name, terms));
    }

    if let Some(dirs) = params.dirs.as_deref() {
        items.retain(|item| item.directories.starts_with(dirs));
    }

    if let Some(Some(mode)) = params.order_by {
        mode.sort(&mut items);
    }

    let matched = items.len();
    let pagination = params.pagination();
    if let Some(page) = pagination {
        let (start, end) = page.bounds(items.len());
        items.truncate(end);
        items.drain(..start);
        if let Some(limit) = params.limit {
            items.truncate(limit);
        }
    }

    QueryOutcome {
        entries: items,
        matched,
        cycle: snapshot.cycle(),
        pagination,
    }
}

fn base_set(snapshot: &Snapshot, params: &QueryParams) -> Vec<ListEntry> {
    if let Some(terms) = params.filter.as_deref() {
        return snapshot
            .iter()
            .filter(|entry| contains_all(&entry.name, terms))
            .map(|entry| entry.to_list_entry())
            .collect();
    }
    if let Some(prefix) = params.typeahead.as_deref() {
        let mut items: Vec<ListEntry> = snapshot
            .iter()
            .filter(|entry| entry.name.starts_with(prefix))
            .map(|entry| entry.to_list_entry())
            .collect();
        SortMode::NameAsc.sort(&mut items);
        return items;
    }
    snapshot.iter().map(|entry| entry.to_list_entry()).collect()
}

fn contains_all(name: &str, terms: &[String]) -> bool {
    terms.iter().all(|term| name.contains(term.as_str()))
}

fn contains_any(name: &str, terms: &[String]) -> bool {
    terms.iter().any(|term| name.contains(term.as_str()))
}
