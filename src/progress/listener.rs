//! # Progress Listeners
//!
//! A progress listener turns a single "progress made" signal into a
//! lease-renewal side effect (semaphore refresh, visibility extension).
//! Each listener type declares a stable key; a broadcaster holds at most
//! one listener per key so the same logical subscriber can never renew a
//! lease twice per signal.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by progress listeners and the broadcaster registry
#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Invalid listener: {reason}")]
    InvalidListener { reason: String },

    #[error("A listener with key '{key}' is already registered")]
    DuplicateListener { key: String },

    #[error("Lease renewal failed: {listener_key}: {message}")]
    RenewalFailed {
        listener_key: String,
        message: String,
    },
}

impl ProgressError {
    pub fn invalid_listener(reason: impl Into<String>) -> Self {
        Self::InvalidListener {
            reason: reason.into(),
        }
    }

    pub fn duplicate_listener(key: impl Into<String>) -> Self {
        Self::DuplicateListener { key: key.into() }
    }

    pub fn renewal_failed(listener_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RenewalFailed {
            listener_key: listener_key.into(),
            message: message.into(),
        }
    }
}

/// Callback fired on every progress signal.
///
/// `key()` is the listener's registration identity: one listener per key
/// per broadcaster. Two instances of the same listener type carry the same
/// key and therefore collide at registration.
#[async_trait]
pub trait ProgressListener: Send + Sync {
    /// Stable registration key for this listener type
    fn key(&self) -> &'static str;

    /// React to one unit of progress; an `Err` evicts the listener
    async fn progress_made(&self) -> Result<(), ProgressError>;
}

/// The signal side handed to running work: fire once per unit of progress
#[async_trait]
pub trait ProgressSignal: Send + Sync {
    async fn fire(&self);
}
