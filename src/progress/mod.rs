//! # Progress
//!
//! The lease-liveness machinery: listeners that turn a progress signal into
//! lease-renewal side effects, the broadcaster that de-duplicates and fires
//! them, and the heartbeat that keeps firing while a unit of work runs.

pub mod broadcaster;
pub mod heartbeat;
pub mod listener;

pub use broadcaster::ProgressBroadcaster;
pub use heartbeat::LeaseHeartbeat;
pub use listener::{ProgressError, ProgressListener, ProgressSignal};
