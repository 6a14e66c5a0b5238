//! # Progress Broadcaster
//!
//! Registry of distinct-keyed listeners that converts one "progress made"
//! signal into every registered lease-renewal side effect. A listener that
//! fails during a fire is evicted and firing continues with the rest, so a
//! broken renewal path can never stall the others.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::listener::{ProgressError, ProgressListener, ProgressSignal};

/// Key-deduplicated listener registry tied to one lease
pub struct ProgressBroadcaster {
    lease_timeout_sec: u64,
    listeners: Mutex<HashMap<&'static str, Arc<dyn ProgressListener>>>,
}

impl ProgressBroadcaster {
    /// Create a broadcaster for a lease of the given timeout
    pub fn new(lease_timeout_sec: u64) -> Self {
        Self {
            lease_timeout_sec,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Timeout of the lease this broadcaster renews, for callers sizing
    /// their own polling frequency against it
    pub fn lease_timeout_sec(&self) -> u64 {
        self.lease_timeout_sec
    }

    /// Register a listener under its key.
    ///
    /// Fails with `InvalidListener` for a blank key and with
    /// `DuplicateListener` when the key is already taken; key identity is
    /// what prevents duplicate lease-renewal side effects from the same
    /// logical subscriber.
    pub fn add_listener(&self, listener: Arc<dyn ProgressListener>) -> Result<(), ProgressError> {
        let key = listener.key();
        if key.trim().is_empty() {
            return Err(ProgressError::invalid_listener(
                "listener key must not be blank",
            ));
        }
        let mut listeners = self.listeners.lock();
        if listeners.contains_key(key) {
            return Err(ProgressError::duplicate_listener(key));
        }
        debug!(listener_key = key, "Registering progress listener");
        listeners.insert(key, listener);
        Ok(())
    }

    /// Remove a listener by pointer identity; no-op when absent
    pub fn remove_listener(&self, listener: &Arc<dyn ProgressListener>) {
        let key = listener.key();
        let mut listeners = self.listeners.lock();
        if let Some(registered) = listeners.get(key) {
            if Arc::ptr_eq(registered, listener) {
                listeners.remove(key);
                debug!(listener_key = key, "Removed progress listener");
            }
        }
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Invoke every registered listener once, in no guaranteed order.
    ///
    /// A listener returning `Err` is logged, permanently evicted, and the
    /// fire continues; the eviction is visible to the next call.
    pub async fn fire(&self) {
        let snapshot: Vec<(&'static str, Arc<dyn ProgressListener>)> = self
            .listeners
            .lock()
            .iter()
            .map(|(key, listener)| (*key, Arc::clone(listener)))
            .collect();

        let results = futures::future::join_all(
            snapshot.iter().map(|(_, listener)| listener.progress_made()),
        )
        .await;

        for ((key, _), result) in snapshot.iter().zip(results) {
            if let Err(error) = result {
                warn!(
                    listener_key = *key,
                    error = %error,
                    "Progress listener failed; evicting it from the registry"
                );
                self.listeners.lock().remove(*key);
            }
        }
    }
}

#[async_trait]
impl ProgressSignal for ProgressBroadcaster {
    async fn fire(&self) {
        ProgressBroadcaster::fire(self).await;
    }
}
