//! Shared helpers for integration tests.

use std::sync::Arc;

use leasework_core::messaging::BatchMessage;
use leasework_core::testing::{InMemoryQueue, InMemorySemaphore};
use leasework_core::worker::{GatedWorkerLoop, GatedWorkerLoopConfig, MessageRunner};

pub const QUEUE: &str = "work-queue";
pub const LOCK_KEY: &str = "worker-lock";

/// Serialize a batch envelope for direct enqueueing
pub fn batch_payload(items: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::to_value(BatchMessage::new(items)).expect("batch serializes")
}

/// Loop wired to the given collaborators with the default test config
pub fn gated_loop_with(
    queue: Arc<InMemoryQueue>,
    semaphore: Arc<InMemorySemaphore>,
    runner: Arc<dyn MessageRunner>,
) -> Arc<GatedWorkerLoop> {
    let config = GatedWorkerLoopConfig::new(LOCK_KEY, QUEUE);
    Arc::new(GatedWorkerLoop::new(config, semaphore, queue, runner).expect("valid loop config"))
}
