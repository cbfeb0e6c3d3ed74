//! Structured filtering.

use tidepool_store::criteria::matches_all;
use tidepool_store::{FilterCriteria, Record};

/// Keep the items satisfying every criterion.
pub fn filter<T: Record>(items: &[T], criteria: &[FilterCriteria]) -> Vec<T> {
    filter_refs(items.iter(), criteria)
        .into_iter()
        .cloned()
        .collect()
}

pub(crate) fn filter_refs<'a, T: Record>(
    items: impl Iterator<Item = &'a T>,
    criteria: &[FilterCriteria],
) -> Vec<&'a T> {
    items.filter(|item| matches_all(*item, criteria)).collect()
}
