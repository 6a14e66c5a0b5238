//! # Messaging
//!
//! Wire shapes and the queue transport seam. The concrete broker lives
//! outside this crate; everything here is either a serde envelope or the
//! trait the core drives the broker through.

pub mod errors;
pub mod message;
pub mod queue_client;

pub use errors::{MessagingError, MessagingResult};
pub use message::{
    BatchMessage, ContinuationRequest, MessageMetadata, QueueMessage, ReceiptHandle,
};
pub use queue_client::QueueClient;
