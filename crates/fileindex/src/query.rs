//! Read-side queries over a published snapshot.
//!
//! - Parameter parsing (`filter`, `exclude`, `dirs`, `orderby`, pagination)
//! - The filter / sort / paginate pipeline
//! - Grouping results into a directory tree

mod engine;
mod group;
mod params;

pub use engine::{query, QueryOutcome};
pub use group::group;
pub use params::{parse_at_least_one, Pagination, QueryParams, SortMode, DEFAULT_PAGE_SIZE};
