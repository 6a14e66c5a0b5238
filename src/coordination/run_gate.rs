//! # Run Gate
//!
//! Optional external predicate that can suppress whole work cycles
//! independent of locking (e.g. the stack is in read-only maintenance
//! mode). A closed gate is a skip, never an error.

use async_trait::async_trait;

/// External boolean predicate checked at the top of every cycle
#[async_trait]
pub trait RunGate: Send + Sync {
    async fn can_run(&self) -> bool;
}
