//! # Batch Splitter
//!
//! Unwraps one transport message carrying an ordered list of sub-units and
//! drives each through an inner runner sequentially. Failures are
//! unit-addressable: a recoverable failure inside a multi-unit batch
//! republishes just that unit instead of failing the whole batch, and a
//! non-recoverable unit is logged and skipped so one bad item never blocks
//! the rest.
//!
//! The singleton case is the exception: a batch of exactly one unit
//! propagates its recoverable failure unchanged, letting the container's
//! redelivery policy govern the retry instead of minting an identical new
//! message.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::errors::WorkerResult;
use super::runner::{LockTimeoutAware, MessageRunner};
use crate::messaging::{BatchMessage, QueueClient};
use crate::progress::ProgressSignal;

/// Splits batch envelopes into sequential runs of an inner runner
pub struct BatchSplitter {
    inner: Arc<dyn MessageRunner>,
    queue: Arc<dyn QueueClient>,
    queue_name: String,
}

impl BatchSplitter {
    /// Wrap `inner` so it receives one sub-unit at a time; recoverable
    /// stragglers are republished to `queue_name`
    pub fn new(
        inner: Arc<dyn MessageRunner>,
        queue: Arc<dyn QueueClient>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            queue,
            queue_name: queue_name.into(),
        }
    }
}

#[async_trait]
impl MessageRunner for BatchSplitter {
    async fn run(
        &self,
        progress: Arc<dyn ProgressSignal>,
        payload: serde_json::Value,
    ) -> WorkerResult<()> {
        let batch = BatchMessage::from_payload(&payload)?;
        let batch_size = batch.len();
        debug!(
            queue_name = %self.queue_name,
            batch_size,
            retry_count = batch.metadata.retry_count,
            "Processing batch message"
        );

        for (index, item) in batch.items.iter().enumerate() {
            // The lease being renewed here is the outer batch message's,
            // not a per-item one.
            progress.fire().await;

            match self
                .inner
                .run(Arc::clone(&progress), item.clone())
                .await
            {
                Ok(()) => {}
                Err(failure) if failure.is_recoverable() => {
                    if batch_size == 1 {
                        return Err(failure);
                    }
                    info!(
                        queue_name = %self.queue_name,
                        item_index = index,
                        reason = %failure,
                        "Recoverable item failure; republishing as a single-unit message"
                    );
                    let retry = BatchMessage::single_retry(item.clone(), &batch.metadata);
                    self.queue
                        .send_json(&self.queue_name, &serde_json::to_value(&retry)?)
                        .await?;
                }
                Err(failure) => {
                    error!(
                        queue_name = %self.queue_name,
                        item_index = index,
                        error = %failure,
                        "Item failed; continuing with the rest of the batch"
                    );
                }
            }
        }

        Ok(())
    }

    fn as_lock_timeout_aware(&self) -> Option<&dyn LockTimeoutAware> {
        self.inner.as_lock_timeout_aware()
    }
}
