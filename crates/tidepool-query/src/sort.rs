//! Single-field stable sort.

use std::cmp::Ordering;

use tidepool_store::{FieldValue, Record, SortDirection};

/// Return the items ordered by `field`.
///
/// The sort is stable. Null values always come last, whatever the direction.
pub fn sort<T: Record>(items: &[T], field: &str, direction: SortDirection) -> Vec<T> {
    sort_refs(items.iter().collect(), field, direction)
        .into_iter()
        .cloned()
        .collect()
}

pub(crate) fn sort_refs<'a, T: Record>(
    items: Vec<&'a T>,
    field: &str,
    direction: SortDirection,
) -> Vec<&'a T> {
    let mut keyed: Vec<(FieldValue, &'a T)> =
        items.into_iter().map(|item| (item.field(field), item)).collect();

    keyed.sort_by(|(a, _), (b, _)| match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = compare_values(a, b);
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    });

    keyed.into_iter().map(|(_, item)| item).collect()
}

/// Ascending comparison of two values.
///
/// Numbers compare numerically, timestamps chronologically, text with
/// locale-style ordering. Values of different types order by type:
/// numbers, timestamps, booleans, text, then null. Ranking keeps the order
/// total when a field mixes numbers with numeric strings.
pub fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => x.total_cmp(y),
        (FieldValue::Timestamp(x), FieldValue::Timestamp(y)) => x.cmp(y),
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x.cmp(y),
        (FieldValue::Text(x), FieldValue::Text(y)) => locale_compare(x, y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Number(_) => 0,
        FieldValue::Timestamp(_) => 1,
        FieldValue::Bool(_) => 2,
        FieldValue::Text(_) => 3,
        FieldValue::Null => 4,
    }
}

/// Case-folded comparison, with lowercase ahead of uppercase on ties.
fn locale_compare(a: &str, b: &str) -> Ordering {
    let folded = a.to_lowercase().cmp(&b.to_lowercase());
    if folded != Ordering::Equal {
        return folded;
    }
    for (x, y) in a.chars().zip(b.chars()) {
        if x != y {
            return match (x.is_lowercase(), y.is_lowercase()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => x.cmp(&y),
            };
        }
    }
    a.len().cmp(&b.len())
}
