use std::time::Duration;

use akidb_core::CoreError;
use thiserror::Error;

/// Errors surfaced to callers of the catalog listing API.
///
/// Partition-scoped failures and unusable pagination tokens never appear
/// here; they are absorbed by the engine.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Request parameters were rejected before any repository was queried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The repository registry could not be read.
    #[error("repository registry unavailable: {0}")]
    RegistryUnavailable(#[source] CoreError),

    /// The caller's cancellation signal fired.
    #[error("request cancelled")]
    Cancelled,

    /// The configured request deadline elapsed.
    #[error("request deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Returns `true` when retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RegistryUnavailable(_) | Self::DeadlineExceeded(_))
    }
}

impl From<CoreError> for CatalogError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(message) => Self::Validation(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Convenient result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
