//! Per-fingerprint fetch serialization.
//!
//! Concurrent requests for the same fingerprint take turns: the second
//! waits for the first to release and then re-evaluates hit/miss/stale
//! (typically finding a fresh hit). Distinct fingerprints never contend.
//! The lease is an owned guard, so it is released on every exit path,
//! including errors and cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct Singleflight {
    // Weak entries so idle leases free themselves; dead ones are swept
    // on the next acquire.
    leases: parking_lot::Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl Singleflight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `key`, waiting for the current holder if any.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lease = {
            let mut leases = self.leases.lock();
            leases.retain(|_, w| w.strong_count() > 0);
            match leases.get(key).and_then(Weak::upgrade) {
                Some(lease) => lease,
                None => {
                    let lease = Arc::new(Mutex::new(()));
                    leases.insert(key.to_string(), Arc::downgrade(&lease));
                    lease
                }
            }
        };
        lease.lock_owned().await
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.leases.lock().len()
    }
}
