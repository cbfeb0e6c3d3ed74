//! Record model and repository contract for Tidepool.
//!
//! This crate provides the pieces every other Tidepool crate builds on:
//!
//! - **Record**: the base contract (`id`, timestamps, per-type field accessor)
//! - **Criteria**: filter and sort criteria with their operator semantics
//! - **Repository**: the capability trait a document store backend implements
//! - **Errors**: raw repository errors and the normalized collection taxonomy
//! - **Memory**: an in-process backend with live snapshot delivery

pub mod criteria;
pub mod document;
mod error;
pub mod memory;
mod record;
mod repository;
mod value;

pub use criteria::{FilterCriteria, FilterOperator, SortCriteria, SortDirection};
pub use document::Document;
pub use error::{CollectionError, ErrorKind, Operation, RepositoryError, Severity};
pub use memory::MemoryRepository;
pub use record::Record;
pub use repository::{DataCallback, ErrorCallback, Repository, Unsubscribe};
pub use value::FieldValue;
