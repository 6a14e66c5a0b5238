//! Crate-level error aggregation.

use thiserror::Error;

use crate::coordination::CoordinationError;
use crate::messaging::MessagingError;
use crate::progress::ProgressError;
use crate::worker::WorkerError;

/// Top-level error for embedders that drive several subsystems at once
#[derive(Error, Debug)]
pub enum LeaseworkError {
    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl LeaseworkError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result type alias for crate-level operations
pub type Result<T> = std::result::Result<T, LeaseworkError>;
