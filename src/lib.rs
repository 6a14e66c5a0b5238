#![allow(clippy::doc_markdown)] // Allow technical terms like JSON, SQL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Leasework Core
//!
//! Concurrency-and-lease core for fleets of independent worker processes
//! pulling work off shared queues under externally-imposed concurrency
//! limits.
//!
//! ## Overview
//!
//! Every worker type in the fleet runs the same skeleton: check an optional
//! run gate, take a slot on a distributed counting semaphore, pull exactly
//! one message, and run it while a heartbeat keeps both the semaphore lease
//! and the message visibility window alive for as long as the work does.
//! On top of that skeleton sit two specialized runners: a batch splitter
//! that makes partial failure unit-addressable, and a continuation driver
//! that walks paginated external query results in bounded slices.
//!
//! The hard invariants live here:
//!
//! - **Liveness**: a lease never expires while useful work proceeds; the
//!   heartbeat fires once per poll timeout and once on completion.
//! - **Safety**: one holder per semaphore acquisition; acquired before any
//!   dequeue, released on every exit path.
//! - **Partial failure**: a multi-unit batch is never all-or-nothing; a
//!   recoverable unit is republished alone, a poison unit is logged and
//!   skipped, and only a singleton batch propagates its recoverable
//!   failure to the container's retry policy.
//!
//! The queue transport, the semaphore service, the run gate, the business
//! runners, and the async query provider are all external collaborators
//! expressed as traits.
//!
//! ## Module Organization
//!
//! - [`worker`] - Gated worker loop, batch splitter, error taxonomy
//! - [`progress`] - Progress broadcaster and lease heartbeat
//! - [`messaging`] - Wire shapes and the queue transport seam
//! - [`coordination`] - Semaphore and run-gate seams
//! - [`query`] - Query provider seam and continuation driver
//! - [`config`] - Configuration with environment overrides
//! - [`logging`] - Structured logging bootstrap
//! - [`testing`] - In-memory fakes of every external seam
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use leasework_core::testing::{InMemoryQueue, InMemorySemaphore, ScriptedRunner};
//! use leasework_core::worker::{GatedWorkerLoop, GatedWorkerLoopConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = InMemoryQueue::new();
//! let semaphore = InMemorySemaphore::new();
//! let runner = ScriptedRunner::succeeding();
//!
//! let config = GatedWorkerLoopConfig::new("reconciler-lock", "reconcile_queue");
//! let worker = GatedWorkerLoop::new(config, semaphore, queue, runner)?;
//!
//! let outcome = worker.run_cycle().await?;
//! println!("cycle outcome: {outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod coordination;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod progress;
pub mod query;
pub mod testing;
pub mod worker;

pub use config::LeaseworkConfig;
pub use coordination::{CoordinationError, RunGate, SemaphoreClient, SemaphoreLease};
pub use error::{LeaseworkError, Result};
pub use messaging::{
    BatchMessage, ContinuationRequest, MessageMetadata, MessagingError, QueueClient, QueueMessage,
    ReceiptHandle,
};
pub use progress::{
    LeaseHeartbeat, ProgressBroadcaster, ProgressError, ProgressListener, ProgressSignal,
};
pub use query::{
    ContinuationDriver, ContinuationSettings, ExecutionState, ExecutionStatus, QueryProvider,
    ResultPage, ResultPageProcessor,
};
pub use worker::{
    BatchSplitter, CycleOutcome, GatedWorkerLoop, GatedWorkerLoopConfig, LockTimeoutAware,
    MessageRunner, WorkerError, WorkerResult,
};
