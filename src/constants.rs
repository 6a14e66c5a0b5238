//! Shared constants for lease sizing and listener identity.

/// Minimum accepted lock/visibility timeout. Anything shorter leaves no
/// room for a heartbeat interval between renewals.
pub const MIN_LEASE_TIMEOUT_SEC: u64 = 30;

/// Lease renewals per timeout window; heartbeat frequency is
/// `timeout / HEARTBEATS_PER_LEASE`.
pub const HEARTBEATS_PER_LEASE: u64 = 3;

/// Default visibility delay applied before redelivering a recoverable
/// failure, when the error carries no hint of its own.
pub const DEFAULT_RECOVERABLE_RETRY_DELAY_SEC: u64 = 5;

/// Default cap on rows fetched per result page.
pub const DEFAULT_MAX_ROWS_PER_PAGE: u32 = 1000;

/// Default cap on page fetches per continuation invocation.
pub const DEFAULT_MAX_PAGE_FETCHES: u32 = 10;

/// Registration keys for the lease-renewal listeners. One listener per key
/// per broadcaster.
pub mod listener_keys {
    /// Semaphore lease refresh listener
    pub const SEMAPHORE_REFRESH: &str = "semaphore-lease-refresh";
    /// Queue message visibility extension listener
    pub const VISIBILITY_EXTENSION: &str = "message-visibility-extension";
}
