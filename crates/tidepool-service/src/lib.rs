//! Write coordination and collection-level operations for Tidepool.
//!
//! - [`MutationCoordinator`]: create/update/delete with in-flight flags and
//!   progress reporting for bulk deletes
//! - [`CollectionService`]: repository access with normalized errors,
//!   search over repository data, CSV/JSON export
//! - [`validate_import`]: schema checks for parsed import rows

pub mod export;
mod import;
mod mutations;
mod service;

pub use export::{ExportError, ExportFormat, ExportOptions};
pub use import::{ImportIssue, ImportSchema, ImportValidation, validate_import};
pub use mutations::{
    MutationCoordinator, MutationErrorCallback, MutationKind, MutationState, ProgressCallback,
};
pub use service::CollectionService;
