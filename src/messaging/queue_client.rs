//! # Queue Client Seam
//!
//! The queue transport is an external collaborator; this trait is the only
//! surface the worker loop, batch splitter, and continuation driver depend
//! on. Implementations wrap whatever broker the deployment uses.

use async_trait::async_trait;

use super::errors::MessagingResult;
use super::message::{QueueMessage, ReceiptHandle};

/// Queue transport operations required by the job-processing core.
///
/// Semantics expected of implementations:
/// - `receive_message` hides the returned message from other consumers for
///   `visibility_timeout_sec`; redelivery happens when the window lapses
///   without a delete.
/// - `extend_visibility` re-arms that window for an in-flight message, and
///   may also shorten it to schedule an early redelivery.
/// - `delete_message` acknowledges and permanently consumes the message.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Pull at most one message off the queue
    async fn receive_message(
        &self,
        queue_name: &str,
        visibility_timeout_sec: u64,
    ) -> MessagingResult<Option<QueueMessage>>;

    /// Publish a JSON payload, returning the transport's message id
    async fn send_json(&self, queue_name: &str, payload: &serde_json::Value)
        -> MessagingResult<i64>;

    /// Acknowledge and remove a message
    async fn delete_message(
        &self,
        queue_name: &str,
        receipt: &ReceiptHandle,
    ) -> MessagingResult<()>;

    /// Reset the visibility window of an in-flight message
    async fn extend_visibility(
        &self,
        queue_name: &str,
        receipt: &ReceiptHandle,
        visibility_timeout_sec: u64,
    ) -> MessagingResult<()>;
}
