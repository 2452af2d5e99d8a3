//! Per-chain serialization of state transitions.
//!
//! One async mutex per chain id. Different chains never contend; there is no
//! global lock held across a transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use waypoint_types::ChainId;

#[derive(Debug, Default)]
pub struct ChainLocks {
    locks: Mutex<HashMap<ChainId, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one transition on one chain.
pub type ChainGuard = OwnedMutexGuard<()>;

impl ChainLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `chain_id`.
    pub async fn acquire(&self, chain_id: ChainId) -> ChainGuard {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            // Entries nobody holds or waits on can go.
            locks.retain(|id, lock| *id == chain_id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(chain_id).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}
