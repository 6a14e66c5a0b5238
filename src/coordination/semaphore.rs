//! # Distributed Semaphore Seam
//!
//! The counting semaphore itself is an external coordination service; the
//! worker loop only needs acquire / refresh / release by key. All calls
//! carry an explicit client handle and lease token, never process-global
//! state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::CoordinationResult;

/// A held semaphore slot: the lock key plus the service-minted token.
///
/// Exactly one holder per acquisition; the token must accompany every
/// refresh and the final release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemaphoreLease {
    pub key: String,
    pub token: String,
}

impl SemaphoreLease {
    pub fn new(key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            token: token.into(),
        }
    }
}

/// Client handle to the external counting-semaphore service.
///
/// `acquire` is non-blocking: a fully-held semaphore yields `Ok(None)`,
/// which the caller treats as "skip this cycle", not as an error.
#[async_trait]
pub trait SemaphoreClient: Send + Sync {
    /// Attempt to take one of `max_holders` slots under `key`, valid for
    /// `timeout_sec` unless refreshed
    async fn acquire(
        &self,
        key: &str,
        max_holders: u32,
        timeout_sec: u64,
    ) -> CoordinationResult<Option<SemaphoreLease>>;

    /// Push the lease expiry out another `timeout_sec`
    async fn refresh(&self, lease: &SemaphoreLease, timeout_sec: u64) -> CoordinationResult<()>;

    /// Give the slot back; must be called exactly once per acquisition
    async fn release(&self, lease: &SemaphoreLease) -> CoordinationResult<()>;
}
