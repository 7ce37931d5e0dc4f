//! Declarative query options and their parsing from request parameters.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::IndexError;
use crate::types::ListEntry;

/// Page size used when pagination is active and none was given.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    /// `name`: lexicographic ascending.
    NameAsc,
    /// `-name`: lexicographic descending.
    NameDesc,
    /// `date`: most recently modified first.
    Newest,
    /// `-date`: least recently modified first.
    Oldest,
}

impl SortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NameAsc => "name",
            Self::NameDesc => "-name",
            Self::Newest => "date",
            Self::Oldest => "-date",
        }
    }

    /// Comparator for this mode.
    pub fn comparator(self) -> fn(&ListEntry, &ListEntry) -> Ordering {
        match self {
            Self::NameAsc => |a, b| a.name.cmp(&b.name),
            Self::NameDesc => |a, b| b.name.cmp(&a.name),
            Self::Newest => |a, b| b.modified_at.cmp(&a.modified_at),
            Self::Oldest => |a, b| a.modified_at.cmp(&b.modified_at),
        }
    }

    /// Stable sort of `items` in this mode.
    pub fn sort(self, items: &mut [ListEntry]) {
        items.sort_by(self.comparator());
    }
}

impl FromStr for SortMode {
    type Err = IndexError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "name" => Ok(Self::NameAsc),
            "-name" => Ok(Self::NameDesc),
            "date" => Ok(Self::Newest),
            "-date" => Ok(Self::Oldest),
            other => Err(IndexError::InvalidInput(format!(
                "unsupported orderby: {other} (expected one of: name, -name, date, -date)"
            ))),
        }
    }
}

/// Options recognized by the query engine. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    /// Every term must occur in the name.
    pub filter: Option<Vec<String>>,
    /// Name prefix; ignored when `filter` is given.
    pub typeahead: Option<String>,
    /// No term may occur in the name.
    pub exclude: Option<Vec<String>>,
    /// Directory scope as path segments.
    pub dirs: Option<Vec<String>>,
    /// `Some(None)` is an unrecognized sort key, which keeps the current order.
    pub order_by: Option<Option<SortMode>>,
    pub limit: Option<usize>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = Some(terms.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_typeahead(mut self, prefix: impl Into<String>) -> Self {
        self.typeahead = Some(prefix.into());
        self
    }

    pub fn with_exclude<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(terms.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_dirs<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dirs = Some(segments.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_order(mut self, mode: SortMode) -> Self {
        self.order_by = Some(Some(mode));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = Some(page.max(1));
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Builds params from raw request pairs.
    ///
    /// List options may be repeated and accept an optional `[]` suffix
    /// (`filter[]=a&filter=b`). For single-valued options the first value
    /// wins. Numeric options that are not positive integers are coerced to 1.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let key = key.as_ref();
            let key = key.strip_suffix("[]").unwrap_or(key);
            let value: String = value.into();
            match key {
                "filter" => params.filter.get_or_insert_with(Vec::new).push(value),
                "exclude" => params.exclude.get_or_insert_with(Vec::new).push(value),
                "dirs" => params.dirs.get_or_insert_with(Vec::new).push(value),
                "typeahead" => {
                    params.typeahead.get_or_insert(value);
                }
                "orderby" => {
                    params.order_by.get_or_insert_with(|| value.parse().ok());
                }
                "limit" => {
                    params.limit.get_or_insert(parse_at_least_one(&value));
                }
                "page" => {
                    params.page.get_or_insert(parse_at_least_one(&value));
                }
                "pagesize" => {
                    params.page_size.get_or_insert(parse_at_least_one(&value));
                }
                _ => {}
            }
        }
        params
    }

    /// Whether the result is sliced at all.
    pub fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.page.is_some()
    }

    /// Resolved `(page, page_size)` when pagination is active.
    pub fn pagination(&self) -> Option<Pagination> {
        if !self.is_paginated() {
            return None;
        }
        Some(Pagination {
            page: self.page.unwrap_or(1).max(1),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
        })
    }
}

/// Resolved pagination for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
}

impl Pagination {
    /// Clamped `[start, end)` bounds of this page within `len` items.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let start = (self.page - 1).saturating_mul(self.page_size).min(len);
        let end = start.saturating_add(self.page_size).min(len);
        (start, end)
    }
}

/// Parses a positive integer, coercing anything else to 1.
pub fn parse_at_least_one(raw: &str) -> usize {
    raw.trim().parse::<usize>().unwrap_or(1).max(1)
}
