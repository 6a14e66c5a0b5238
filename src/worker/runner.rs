//! # Message Runner Seam
//!
//! A runner is the pluggable business end of a worker: it receives one
//! opaque payload plus a progress handle and does whatever the message
//! means. Runners signal "retry me later" with the recoverable error
//! variant; everything else is treated as poison by the loop.

use std::time::Duration;

use async_trait::async_trait;
use std::sync::Arc;

use super::errors::WorkerResult;
use crate::progress::ProgressSignal;

/// Capability for runners that size internal waits against the lease.
///
/// The loop informs a timeout-aware runner of the configured lock timeout
/// before its first run, so the runner never waits past its own lease.
pub trait LockTimeoutAware: Send + Sync {
    fn set_lock_timeout(&self, timeout: Duration);
}

/// One unit of work over an opaque payload
#[async_trait]
pub trait MessageRunner: Send + Sync {
    /// Process a single payload, firing `progress` whenever meaningful
    /// forward progress is made
    async fn run(
        &self,
        progress: Arc<dyn ProgressSignal>,
        payload: serde_json::Value,
    ) -> WorkerResult<()>;

    /// Declare interest in the configured lock timeout
    fn as_lock_timeout_aware(&self) -> Option<&dyn LockTimeoutAware> {
        None
    }
}
