//! Free-text search across a set of fields.

use tidepool_store::Record;

/// Keep the items where any of `fields` contains `query`, ignoring case.
///
/// A blank query is a no-op and returns every item.
pub fn search<T, S>(items: &[T], query: &str, fields: &[S]) -> Vec<T>
where
    T: Record,
    S: AsRef<str>,
{
    search_refs(items.iter(), query, fields)
        .into_iter()
        .cloned()
        .collect()
}

pub(crate) fn search_refs<'a, T, S>(
    items: impl Iterator<Item = &'a T>,
    query: &str,
    fields: &[S],
) -> Vec<&'a T>
where
    T: Record,
    S: AsRef<str>,
{
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items.collect();
    }
    items
        .filter(|item| matches_query(*item, &needle, fields))
        .collect()
}

fn matches_query<T: Record, S: AsRef<str>>(item: &T, needle: &str, fields: &[S]) -> bool {
    fields.iter().any(|field| {
        item.field(field.as_ref())
            .as_text()
            .is_some_and(|text| !text.is_empty() && text.to_lowercase().contains(needle))
    })
}
