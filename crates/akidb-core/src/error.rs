use thiserror::Error;

/// Canonical error type for backing-store and registry operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Entity was not found in the backing store.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"repository"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// The backing store rejected the call because of rate limiting.
    #[error("throttled: {message}")]
    Throttled {
        /// Human-readable throttling reason.
        message: String,
    },

    /// The call did not complete before its deadline.
    #[error("operation `{operation}` timed out after {elapsed_ms}ms")]
    Timeout {
        /// Logical operation name (e.g. `"query"`).
        operation: &'static str,
        /// Time spent before giving up.
        elapsed_ms: u64,
    },

    /// The backing store or registry cannot currently be reached.
    #[error("unavailable: {message}")]
    Unavailable {
        /// Human-readable details.
        message: String,
    },

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Validation error for input data.
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl CoreError {
    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a `Throttled` variant.
    #[must_use]
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Throttled {
            message: message.into(),
        }
    }

    /// Creates an `Unavailable` variant.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for failures worth retrying (throttling, timeouts, outages).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::Timeout { .. } | Self::Unavailable { .. }
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() {
            Self::DeserializationError(err.to_string())
        } else {
            Self::SerializationError(err.to_string())
        }
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
