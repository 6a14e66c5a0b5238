//! # Configuration
//!
//! Tunables shared by every worker loop in a process, with environment
//! overrides. Deployment-specific identity (semaphore key, queue name) is
//! supplied per loop; everything else defaults here.

use std::time::Duration;

use crate::constants::{
    DEFAULT_MAX_PAGE_FETCHES, DEFAULT_MAX_ROWS_PER_PAGE, DEFAULT_RECOVERABLE_RETRY_DELAY_SEC,
    MIN_LEASE_TIMEOUT_SEC,
};
use crate::error::{LeaseworkError, Result};
use crate::query::ContinuationSettings;
use crate::worker::GatedWorkerLoopConfig;

#[derive(Debug, Clone)]
pub struct LeaseworkConfig {
    /// Fleet-wide concurrent holders per semaphore key
    pub max_lock_count: u32,
    /// Lease duration for semaphore slots and message visibility
    pub lock_and_visibility_timeout_sec: u64,
    /// Redelivery delay for recoverable failures without their own hint
    pub recoverable_retry_delay_sec: u64,
    /// Sleep between idle worker cycles, in milliseconds
    pub idle_backoff_ms: u64,
    /// Row cap per result-page fetch
    pub max_rows_per_page: u32,
    /// Page-fetch cap per continuation invocation
    pub max_page_fetches: u32,
}

impl Default for LeaseworkConfig {
    fn default() -> Self {
        Self {
            max_lock_count: 10,
            lock_and_visibility_timeout_sec: MIN_LEASE_TIMEOUT_SEC,
            recoverable_retry_delay_sec: DEFAULT_RECOVERABLE_RETRY_DELAY_SEC,
            idle_backoff_ms: 2000,
            max_rows_per_page: DEFAULT_MAX_ROWS_PER_PAGE,
            max_page_fetches: DEFAULT_MAX_PAGE_FETCHES,
        }
    }
}

impl LeaseworkConfig {
    /// Defaults overridden by `LEASEWORK_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("LEASEWORK_MAX_LOCK_COUNT") {
            config.max_lock_count = value.parse().map_err(|e| {
                LeaseworkError::configuration(format!("Invalid max_lock_count: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("LEASEWORK_LOCK_TIMEOUT_SEC") {
            config.lock_and_visibility_timeout_sec = value.parse().map_err(|e| {
                LeaseworkError::configuration(format!(
                    "Invalid lock_and_visibility_timeout_sec: {e}"
                ))
            })?;
        }

        if let Ok(value) = std::env::var("LEASEWORK_RETRY_DELAY_SEC") {
            config.recoverable_retry_delay_sec = value.parse().map_err(|e| {
                LeaseworkError::configuration(format!("Invalid recoverable_retry_delay_sec: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("LEASEWORK_IDLE_BACKOFF_MS") {
            config.idle_backoff_ms = value.parse().map_err(|e| {
                LeaseworkError::configuration(format!("Invalid idle_backoff_ms: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("LEASEWORK_MAX_ROWS_PER_PAGE") {
            config.max_rows_per_page = value.parse().map_err(|e| {
                LeaseworkError::configuration(format!("Invalid max_rows_per_page: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("LEASEWORK_MAX_PAGE_FETCHES") {
            config.max_page_fetches = value.parse().map_err(|e| {
                LeaseworkError::configuration(format!("Invalid max_page_fetches: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Loop config for one worker identity, carrying these tunables
    pub fn worker_loop_config(
        &self,
        semaphore_key: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> GatedWorkerLoopConfig {
        let mut config = GatedWorkerLoopConfig::new(semaphore_key, queue_name);
        config.max_lock_count = self.max_lock_count;
        config.lock_and_visibility_timeout_sec = self.lock_and_visibility_timeout_sec;
        config.recoverable_retry_delay_sec = self.recoverable_retry_delay_sec;
        config.idle_backoff = Duration::from_millis(self.idle_backoff_ms);
        config
    }

    /// Continuation budgets carried by these tunables
    pub fn continuation_settings(&self) -> ContinuationSettings {
        ContinuationSettings {
            max_rows_per_page: self.max_rows_per_page,
            max_page_fetches: self.max_page_fetches,
        }
    }
}
