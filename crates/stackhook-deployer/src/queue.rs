//! Arrival-order queues, one per identity.
//!
//! A request takes its place in line synchronously, before the caller
//! returns, so requests for one identity are handled in the order they
//! were received regardless of how tasks are scheduled.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use stackhook_core::{ContentHash, DeploymentRequest};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Default)]
pub struct RequestQueues {
    senders: Mutex<HashMap<ContentHash, UnboundedSender<DeploymentRequest>>>,
}

impl RequestQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `request` to its identity's queue.
    ///
    /// Returns the receiving end when this call created the queue; the
    /// caller must start a worker draining it. A queue whose worker has
    /// gone away is replaced.
    pub fn push(&self, request: DeploymentRequest) -> Option<UnboundedReceiver<DeploymentRequest>> {
        let key = request.identity().composite_hash;
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);

        let request = match senders.get(&key) {
            Some(tx) => match tx.send(request) {
                Ok(()) => return None,
                Err(mpsc::error::SendError(request)) => request,
            },
            None => request,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(request);
        senders.insert(key, tx);
        Some(rx)
    }

    /// Number of identities with a queue.
    pub fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
