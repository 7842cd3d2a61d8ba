//! Variant lease pool
//!
//! The concurrency-limiting primitive of the engine: a fixed set of
//! pre-cloned variant ids handed out one at a time. A lease grants
//! exclusive ownership of one id for the duration of a task; dropping the
//! lease returns the id to the pool unconditionally, which is what makes
//! release guaranteed on error and panic paths alike.

use crate::error::PoolError;
use csa_model::VariantId;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Fixed-capacity pool of leased variant ids.
///
/// Invariant: available + leased == capacity at all times; no id is ever
/// duplicated or lost. Delivery order is unspecified.
#[derive(Debug)]
pub struct VariantLeasePool {
    tx: mpsc::UnboundedSender<VariantId>,
    rx: Mutex<mpsc::UnboundedReceiver<VariantId>>,
    capacity: usize,
}

impl VariantLeasePool {
    /// Create a pool over pre-cloned variant ids
    #[must_use]
    pub fn new(variants: Vec<VariantId>) -> Arc<Self> {
        let capacity = variants.len();
        let (tx, rx) = mpsc::unbounded_channel();
        for variant in variants {
            // The receiver is alive, send cannot fail here
            let _ = tx.send(variant);
        }
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        })
    }

    /// Number of ids managed by the pool
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lease one variant id, suspending until one is available.
    ///
    /// # Errors
    /// `PoolError::Closed` when the pool was torn down while waiting.
    pub async fn acquire(self: &Arc<Self>) -> Result<VariantLease, PoolError> {
        let mut rx = self.rx.lock().await;
        let id = rx.recv().await.ok_or(PoolError::Closed)?;
        Ok(VariantLease {
            id,
            tx: self.tx.clone(),
        })
    }
}

/// Exclusive ownership of one leased variant id.
///
/// Dropping the lease returns the id to the pool.
#[derive(Debug)]
pub struct VariantLease {
    id: VariantId,
    tx: mpsc::UnboundedSender<VariantId>,
}

impl VariantLease {
    /// The leased variant id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &VariantId {
        &self.id
    }
}

impl Drop for VariantLease {
    fn drop(&mut self) {
        // Send only fails when the pool itself is gone, in which case
        // there is nothing left to return the id to.
        let _ = self.tx.send(self.id.clone());
    }
}
