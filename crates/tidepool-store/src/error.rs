//! Error types for repositories and collection operations.

use std::fmt;

use thiserror::Error;

/// Errors a repository backend can raise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// Record not found.
    #[error("record not found: {id}")]
    NotFound { id: String },

    /// Caller lacks access to the collection or record.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The store could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The payload was rejected.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The store did not answer in time.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// A concurrent write won.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    /// The detail text without the variant prefix.
    fn detail(&self) -> String {
        match self {
            RepositoryError::NotFound { id } => format!("record not found: {}", id),
            RepositoryError::PermissionDenied(m)
            | RepositoryError::Network(m)
            | RepositoryError::Validation(m)
            | RepositoryError::Timeout(m)
            | RepositoryError::Conflict(m)
            | RepositoryError::Backend(m) => m.clone(),
        }
    }
}

/// Category of a normalized collection error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    NetworkError,
    ValidationError,
    Timeout,
    Conflict,
    OperationFailed,
    UnknownError,
}

impl ErrorKind {
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::ValidationError => Severity::Low,
            ErrorKind::NotFound
            | ErrorKind::NetworkError
            | ErrorKind::Timeout
            | ErrorKind::Conflict
            | ErrorKind::OperationFailed => Severity::Medium,
            ErrorKind::PermissionDenied | ErrorKind::UnknownError => Severity::High,
        }
    }

    /// Whether a caller may retry or the user may resubmit.
    pub fn is_recoverable(self) -> bool {
        match self {
            ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::UnknownError => false,
            ErrorKind::NetworkError
            | ErrorKind::ValidationError
            | ErrorKind::Timeout
            | ErrorKind::Conflict
            | ErrorKind::OperationFailed => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::OperationFailed => "OPERATION_FAILED",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&RepositoryError> for ErrorKind {
    fn from(err: &RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { .. } => ErrorKind::NotFound,
            RepositoryError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            RepositoryError::Network(_) => ErrorKind::NetworkError,
            RepositoryError::Validation(_) => ErrorKind::ValidationError,
            RepositoryError::Timeout(_) => ErrorKind::Timeout,
            RepositoryError::Conflict(_) => ErrorKind::Conflict,
            RepositoryError::Backend(_) => ErrorKind::OperationFailed,
        }
    }
}

/// How serious an error is for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// The collection operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Create,
    Update,
    Delete,
    BulkDelete,
    Search,
    Export,
    Subscribe,
}

impl Operation {
    /// Stable failure code for this operation.
    pub fn code(self) -> &'static str {
        match self {
            Operation::Fetch => "FETCH_FAILED",
            Operation::Create => "CREATE_FAILED",
            Operation::Update => "UPDATE_FAILED",
            Operation::Delete => "DELETE_FAILED",
            Operation::BulkDelete => "BULK_DELETE_FAILED",
            Operation::Search => "SEARCH_FAILED",
            Operation::Export => "EXPORT_FAILED",
            Operation::Subscribe => "SUBSCRIBE_FAILED",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A repository failure normalized for consumers.
///
/// Raw backend errors never reach consumers directly; services and the
/// mutation coordinator wrap them in this type.
#[derive(Debug, Clone, Error)]
#[error("{operation} ({kind}): {message}")]
pub struct CollectionError {
    kind: ErrorKind,
    operation: Operation,
    message: String,
    #[source]
    source: Option<RepositoryError>,
}

impl CollectionError {
    pub fn new(kind: ErrorKind, operation: Operation, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a repository error raised during `operation`.
    pub fn from_repository(operation: Operation, err: RepositoryError) -> Self {
        Self {
            kind: ErrorKind::from(&err),
            operation,
            message: err.detail(),
            source: Some(err),
        }
    }

    /// A missing-record error for `id`.
    pub fn not_found(operation: Operation, id: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            operation,
            format!("record not found: {}", id),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Failure code of the operation, e.g. `FETCH_FAILED`.
    pub fn code(&self) -> &'static str {
        self.operation.code()
    }

    /// The technical message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    /// The wrapped repository error, if any.
    pub fn repository_error(&self) -> Option<&RepositoryError> {
        self.source.as_ref()
    }

    /// Message suitable for showing to a user.
    ///
    /// Validation messages are already user-actionable and pass through
    /// verbatim.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::ValidationError => self.message.clone(),
            ErrorKind::NotFound => "The requested item could not be found.".to_string(),
            ErrorKind::PermissionDenied => {
                "You do not have permission to perform this action.".to_string()
            }
            ErrorKind::NetworkError => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            ErrorKind::Timeout => "The request took too long. Please try again.".to_string(),
            ErrorKind::Conflict => {
                "This item was changed elsewhere. Refresh and try again.".to_string()
            }
            ErrorKind::OperationFailed => {
                "The operation could not be completed. Please try again.".to_string()
            }
            ErrorKind::UnknownError => "An unexpected error occurred.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(!ErrorKind::NotFound.is_recoverable());
        assert!(!ErrorKind::PermissionDenied.is_recoverable());
        assert!(ErrorKind::NetworkError.is_recoverable());
        assert!(ErrorKind::Timeout.is_recoverable());
        assert!(ErrorKind::Conflict.is_recoverable());
        assert!(ErrorKind::OperationFailed.is_recoverable());
    }

    #[test]
    fn test_from_repository_keeps_source() {
        let err = CollectionError::from_repository(
            Operation::Fetch,
            RepositoryError::Network("connection reset".to_string()),
        );
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert_eq!(err.code(), "FETCH_FAILED");
        assert_eq!(err.message(), "connection reset");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(
            err.to_string(),
            "FETCH_FAILED (NETWORK_ERROR): connection reset"
        );
    }

    #[test]
    fn test_user_message_differs_from_technical_message() {
        let err = CollectionError::from_repository(
            Operation::Update,
            RepositoryError::Timeout("deadline exceeded after 30s".to_string()),
        );
        assert_ne!(err.user_message(), err.message());
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = CollectionError::from_repository(
            Operation::Create,
            RepositoryError::Validation("title is required".to_string()),
        );
        assert_eq!(err.user_message(), "title is required");
        assert_eq!(err.severity(), Severity::Low);
    }
}
