//! Error types for the distributed coordination seam.

use thiserror::Error;

/// Errors surfaced by semaphore service implementations
#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("Semaphore operation failed: {key}: {operation}: {message}")]
    SemaphoreOperation {
        key: String,
        operation: String,
        message: String,
    },

    #[error("Lease expired or unknown: {key}: {token}")]
    LeaseExpired { key: String, token: String },

    #[error("Coordination service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl CoordinationError {
    /// Create a semaphore operation error
    pub fn semaphore_operation(
        key: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SemaphoreOperation {
            key: key.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a lease expired error
    pub fn lease_expired(key: impl Into<String>, token: impl Into<String>) -> Self {
        Self::LeaseExpired {
            key: key.into(),
            token: token.into(),
        }
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }
}

/// Result type alias for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;
