//! # Worker Error Taxonomy
//!
//! The recoverable-versus-fatal distinction is a first-class enum variant
//! checked explicitly at each call site, not a catch-by-class pattern. The
//! gated loop keys its ACK/REQUEUE decision off `is_recoverable()`; the
//! batch splitter and continuation driver produce these variants directly.

use std::time::Duration;

use thiserror::Error;

use crate::coordination::CoordinationError;
use crate::messaging::MessagingError;
use crate::progress::ProgressError;

/// Failure classification for a unit of work
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The same unit of work may succeed if retried later. Carries an
    /// optional hint for how soon the redelivery should happen.
    #[error("Recoverable failure: {message}")]
    Recoverable {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The unit of work can never succeed as given (poison)
    #[error("Fatal worker failure: {message}")]
    Fatal { message: String },

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl WorkerError {
    /// Create a recoverable failure with no redelivery hint
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create a recoverable failure hinting at a redelivery delay
    pub fn recoverable_after(message: impl Into<String>, retry_after: Duration) -> Self {
        Self::Recoverable {
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a fatal (poison) failure
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// True when the work should be left for redelivery rather than consumed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }

    /// Redelivery hint, when one was attached to a recoverable failure
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Recoverable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Messaging(err.into())
    }
}

/// Result type alias for units of work
pub type WorkerResult<T> = Result<T, WorkerError>;
