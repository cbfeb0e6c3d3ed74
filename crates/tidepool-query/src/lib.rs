//! Query engine for Tidepool collections.
//!
//! A stateless three-stage pipeline over in-memory records:
//!
//! 1. **Search**: case-insensitive substring match across a field set
//! 2. **Filter**: AND-combined predicates with fixed operator semantics
//! 3. **Sort**: stable single-field sort with nulls always last
//!
//! [`CollectionQuery`] keeps the inputs of the pipeline as mutable state for
//! consumers that edit a query interactively.

mod filter;
mod page;
mod pipeline;
mod search;
mod sort;
mod state;

pub use filter::filter;
pub use page::{Page, paginate};
pub use pipeline::search_filter_sort;
pub use search::search;
pub use sort::{compare_values, sort};
pub use state::{CollectionQuery, QueryResult};

pub use tidepool_store::{FilterCriteria, FilterOperator, SortCriteria, SortDirection};
