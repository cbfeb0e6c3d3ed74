//! Property-based tests for the query pipeline over a typed record.

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::cmp::Ordering;
use tidepool_query::{
    FilterCriteria, FilterOperator, SortCriteria, SortDirection, compare_values, filter, search,
    search_filter_sort, sort,
};
use tidepool_store::{Document, FieldValue, Record};

#[derive(Debug, Clone, PartialEq)]
struct Person {
    id: String,
    name: Option<String>,
    age: Option<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct PersonPatch {
    name: Option<String>,
    age: Option<i64>,
}

impl Record for Person {
    type Draft = PersonPatch;
    type Patch = PersonPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => self.id.as_str().into(),
            "name" => self.name.clone().into(),
            "age" => self.age.into(),
            _ => FieldValue::Null,
        }
    }

    fn materialize(id: String, now: DateTime<Utc>, draft: PersonPatch) -> Self {
        Self {
            id,
            name: draft.name,
            age: draft.age,
            created_at: now,
        }
    }

    fn apply_patch(&mut self, patch: PersonPatch, _now: DateTime<Utc>) {
        if patch.name.is_some() {
            self.name = patch.name;
        }
        if patch.age.is_some() {
            self.age = patch.age;
        }
    }
}

fn person() -> impl Strategy<Value = (Option<String>, Option<i64>)> {
    (
        proptest::option::of("[a-zA-Z]{0,8}"),
        proptest::option::of(0i64..100),
    )
}

fn people() -> impl Strategy<Value = Vec<Person>> {
    prop::collection::vec(person(), 0..30).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (name, age))| Person {
                id: format!("p{}", i),
                name,
                age,
                created_at: Utc::now(),
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn gte_filter_is_exact(items in people(), threshold in 0i64..100) {
        let found = filter(&items, &[FilterCriteria::new("age", FilterOperator::Gte, threshold)]);
        let expected: Vec<_> = items
            .iter()
            .filter(|p| p.age.is_some_and(|a| a >= threshold))
            .cloned()
            .collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn filter_never_admits_null(items in people(), threshold in 0i64..100) {
        for op in [FilterOperator::Gt, FilterOperator::Lt, FilterOperator::Gte, FilterOperator::Lte] {
            let found = filter(&items, &[FilterCriteria::new("age", op, threshold)]);
            prop_assert!(found.iter().all(|p| p.age.is_some()));
        }
    }

    #[test]
    fn blank_search_is_identity(items in people(), spaces in " {0,4}") {
        prop_assert_eq!(search(&items, &spaces, &["name"]), items);
    }

    #[test]
    fn search_results_contain_query(items in people(), query in "[a-z]{1,2}") {
        let found = search(&items, &query, &["name"]);
        for p in &found {
            let name = p.name.as_deref().unwrap_or_default().to_lowercase();
            prop_assert!(name.contains(&query));
        }
    }

    #[test]
    fn sort_is_permutation_with_nulls_last(items in people(), desc in any::<bool>()) {
        let direction = if desc { SortDirection::Desc } else { SortDirection::Asc };
        let sorted = sort(&items, "age", direction);
        prop_assert_eq!(sorted.len(), items.len());

        let first_null = sorted.iter().position(|p| p.age.is_none()).unwrap_or(sorted.len());
        prop_assert!(sorted[first_null..].iter().all(|p| p.age.is_none()));

        let ages: Vec<i64> = sorted[..first_null].iter().filter_map(|p| p.age).collect();
        for pair in ages.windows(2) {
            if desc {
                prop_assert!(pair[0] >= pair[1]);
            } else {
                prop_assert!(pair[0] <= pair[1]);
            }
        }

        let mut before: Vec<_> = items.iter().map(|p| p.id.clone()).collect();
        let mut after: Vec<_> = sorted.iter().map(|p| p.id.clone()).collect();
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn sort_is_stable_for_equal_keys(items in people()) {
        let sorted = sort(&items, "age", SortDirection::Asc);
        for pair in sorted.windows(2) {
            if pair[0].age == pair[1].age {
                let i: usize = pair[0].id[1..].parse().unwrap();
                let j: usize = pair[1].id[1..].parse().unwrap();
                prop_assert!(i < j);
            }
        }
    }

    #[test]
    fn pipeline_equals_stage_composition(
        items in people(),
        query in "[a-z]{0,1}",
        threshold in 0i64..100,
    ) {
        let filters = [FilterCriteria::new("age", FilterOperator::Lt, threshold)];
        let combined = search_filter_sort(
            &items,
            &query,
            &["name"],
            &filters,
            Some(&SortCriteria::asc("name")),
        );
        let staged = sort(&filter(&search(&items, &query, &["name"]), &filters), "name", SortDirection::Asc);
        prop_assert_eq!(combined, staged);
    }
}

/// Documents whose `v` field mixes JSON numbers, numeric strings and nulls.
fn mixed_documents() -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec((0u32..200, 0u8..3), 0..80).prop_map(|values| {
        values
            .into_iter()
            .enumerate()
            .map(|(i, (n, shape))| {
                let v = match shape {
                    0 => json!(n),
                    1 => json!(n.to_string()),
                    _ => Value::Null,
                };
                Document::from_json(format!("d{}", i), json!({ "v": v }))
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn sort_of_mixed_numbers_and_strings_is_a_total_order(
        items in mixed_documents(),
        desc in any::<bool>(),
    ) {
        let direction = if desc { SortDirection::Desc } else { SortDirection::Asc };
        let sorted = sort(&items, "v", direction);

        let mut before: Vec<_> = items.iter().map(|d| d.id.clone()).collect();
        let mut after: Vec<_> = sorted.iter().map(|d| d.id.clone()).collect();
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);

        let values: Vec<FieldValue> = sorted.iter().map(|d| d.field("v")).collect();
        let first_null = values.iter().position(FieldValue::is_null).unwrap_or(values.len());
        prop_assert!(values[first_null..].iter().all(FieldValue::is_null));
        for pair in values[..first_null].windows(2) {
            let ord = compare_values(&pair[0], &pair[1]);
            let expected = if desc { Ordering::Less } else { Ordering::Greater };
            prop_assert_ne!(ord, expected);
        }
    }
}

#[test]
fn sort_places_null_name_last() {
    let make = |id: &str, name: Option<&str>| Person {
        id: id.to_string(),
        name: name.map(str::to_string),
        age: None,
        created_at: Utc::now(),
    };
    let items = vec![make("1", Some("b")), make("2", None), make("3", Some("a"))];

    let asc: Vec<_> = sort(&items, "name", SortDirection::Asc)
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(asc, vec![Some("a".to_string()), Some("b".to_string()), None]);

    let desc: Vec<_> = sort(&items, "name", SortDirection::Desc)
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(desc, vec![Some("b".to_string()), Some("a".to_string()), None]);
}
