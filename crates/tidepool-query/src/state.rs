//! Editable query state.

use tidepool_store::{FilterCriteria, Record, SortCriteria, SortDirection};

use crate::search_filter_sort;

/// Outcome of applying a [`CollectionQuery`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    pub items: Vec<T>,
    /// Size of the input collection.
    pub total: usize,
    /// Number of items that survived search and filter.
    pub matched: usize,
}

/// The inputs of the query pipeline, held as state a consumer edits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionQuery {
    query: String,
    search_fields: Vec<String>,
    filters: Vec<FilterCriteria>,
    sort: Option<SortCriteria>,
}

impl CollectionQuery {
    /// Create a query that searches the given fields.
    pub fn new<S: Into<String>>(search_fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            search_fields: search_fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn search_fields(&self) -> &[String] {
        &self.search_fields
    }

    pub fn filters(&self) -> &[FilterCriteria] {
        &self.filters
    }

    pub fn sort(&self) -> Option<&SortCriteria> {
        self.sort.as_ref()
    }

    pub fn set_query(&mut self, query: impl Into<String>) -> &mut Self {
        self.query = query.into();
        self
    }

    pub fn set_search_fields<S: Into<String>>(
        &mut self,
        fields: impl IntoIterator<Item = S>,
    ) -> &mut Self {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_filter(&mut self, criteria: FilterCriteria) -> &mut Self {
        self.filters.push(criteria);
        self
    }

    /// Drop every filter on `field`.
    pub fn remove_filter(&mut self, field: &str) -> &mut Self {
        self.filters.retain(|c| c.field != field);
        self
    }

    pub fn clear_filters(&mut self) -> &mut Self {
        self.filters.clear();
        self
    }

    pub fn set_sort(&mut self, sort: SortCriteria) -> &mut Self {
        self.sort = Some(sort);
        self
    }

    /// Sort by `field`, flipping the direction if it is already the sort
    /// field and starting ascending otherwise.
    pub fn toggle_sort(&mut self, field: &str) -> &mut Self {
        self.sort = Some(match self.sort.take() {
            Some(current) if current.field == field => SortCriteria {
                direction: current.direction.reversed(),
                ..current
            },
            _ => SortCriteria {
                field: field.to_string(),
                direction: SortDirection::Asc,
            },
        });
        self
    }

    pub fn clear_sort(&mut self) -> &mut Self {
        self.sort = None;
        self
    }

    /// Clear query, filters and sort. Search fields are kept.
    pub fn reset(&mut self) -> &mut Self {
        self.query.clear();
        self.filters.clear();
        self.sort = None;
        self
    }

    /// Whether any stage would change the input.
    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty() || !self.filters.is_empty() || self.sort.is_some()
    }

    /// Run the pipeline over `items`.
    pub fn apply<T: Record>(&self, items: &[T]) -> QueryResult<T> {
        let result = search_filter_sort(
            items,
            &self.query,
            &self.search_fields,
            &self.filters,
            self.sort.as_ref(),
        );
        QueryResult {
            total: items.len(),
            matched: result.len(),
            items: result,
        }
    }
}
