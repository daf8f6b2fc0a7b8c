//! Per-identity serialization of lifecycle operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use stackhook_core::ContentHash;
use tokio::sync::OwnedMutexGuard;

/// One async mutex per composite hash, created on first use and kept for
/// the life of the process. Waiters are served in arrival order.
#[derive(Default)]
pub struct IdentityLocks {
    locks: Mutex<HashMap<ContentHash, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn acquire(&self, key: &ContentHash) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of identities seen so far.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
