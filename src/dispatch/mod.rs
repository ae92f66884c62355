//! Bounded execution dispatcher for blocking provider work.
//!
//! Inference calls are CPU/GPU-bound and must never block the request
//! accepting context. Each call occupies one worker slot for its duration;
//! callers waiting for a slot queue FIFO up to the configured depth, and
//! anything beyond that is rejected immediately.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task;

use crate::InpaintError;

/// Bounded pool of worker slots with a bounded admission queue.
#[derive(Clone)]
pub struct Dispatcher {
    slots: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    pool_size: usize,
}

impl Dispatcher {
    /// Creates a dispatcher with `pool_size` concurrent slots and room for
    /// `queue_depth` further submissions waiting on a slot.
    pub fn new(pool_size: usize, queue_depth: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(pool_size)),
            admission: Arc::new(Semaphore::new(pool_size + queue_depth)),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Slots not currently occupied by running work.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Runs a blocking task on the worker pool and awaits its result.
    ///
    /// Returns `Overloaded` without queueing when execution and queue
    /// capacity are both exhausted. Both permits travel into the worker
    /// closure: capacity stays occupied until the work genuinely finishes,
    /// even if the awaiting caller abandons the result at a deadline.
    pub async fn submit<T, F>(&self, task: F) -> Result<T, InpaintError>
    where
        F: FnOnce() -> Result<T, InpaintError> + Send + 'static,
        T: Send + 'static,
    {
        let admission = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| InpaintError::Overloaded)?;
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InpaintError::Config("dispatcher closed".to_string()))?;

        let handle = task::spawn_blocking(move || {
            let _admission = admission;
            let _slot = slot;
            task()
        });
        handle.await.map_err(InpaintError::from)?
    }
}
