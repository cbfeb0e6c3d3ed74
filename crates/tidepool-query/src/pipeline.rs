//! The combined search, filter, sort pipeline.

use tidepool_store::{FilterCriteria, Record, SortCriteria};
use tracing::trace;

use crate::filter::filter_refs;
use crate::search::search_refs;
use crate::sort::sort_refs;

/// Run search, then filter, then sort.
///
/// Search and filter narrow the candidate set before the comparator runs, so
/// the sort only sees survivors.
pub fn search_filter_sort<T, S>(
    items: &[T],
    query: &str,
    search_fields: &[S],
    filters: &[FilterCriteria],
    sort: Option<&SortCriteria>,
) -> Vec<T>
where
    T: Record,
    S: AsRef<str>,
{
    let searched = search_refs(items.iter(), query, search_fields);
    let searched_count = searched.len();
    let filtered = filter_refs(searched.into_iter(), filters);
    trace!(
        total = items.len(),
        searched = searched_count,
        filtered = filtered.len(),
        "query pipeline narrowed candidates"
    );

    let ordered = match sort {
        Some(sort) => sort_refs(filtered, &sort.field, sort.direction),
        None => filtered,
    };
    ordered.into_iter().cloned().collect()
}
