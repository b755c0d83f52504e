//! Bounded worker pool
//!
//! Heavy work (proof-of-work sealing, signature batches, fusion linear
//! algebra) runs on blocking threads behind a semaphore sized from
//! `max_concurrent_operations`. Tickets are released on completion or
//! cancellation; an offloaded closure is never cancelled mid-flight.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker pool is shut down")]
    PoolClosed,
    #[error("offloaded task panicked")]
    TaskPanicked,
}

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `work` on a blocking thread once a ticket is available.
    pub async fn offload<T, F>(&self, work: F) -> Result<T, WorkerError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::PoolClosed)?;
        let result = tokio::task::spawn_blocking(move || {
            let out = work();
            drop(permit);
            out
        })
        .await
        .map_err(|_| WorkerError::TaskPanicked)?;
        Ok(result)
    }
}
