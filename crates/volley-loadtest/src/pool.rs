//! Round-scoped worker pool
//!
//! A pool lives for exactly one round: create it, spawn the round's tasks,
//! then consume it with [`WorkerPool::collect_until`]. Whatever is still
//! running when the pool goes away (deadline passed, early return, panic in
//! the caller) is aborted on drop, so no task outlives its round.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::warn;
use volley_core::{Result, VolleyError};

/// Values that made it back before the deadline
#[derive(Debug)]
pub struct Collected<T> {
    /// Task results in completion order
    pub completed: Vec<T>,

    /// Tasks still running at the deadline, dropped from the round
    pub abandoned: usize,

    /// Tasks that ended without producing a value
    pub crashed: usize,
}

/// Bounded set of worker tasks; at most `size` run their body at once
pub struct WorkerPool<T: 'static> {
    size: usize,
    permits: Arc<Semaphore>,
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(VolleyError::PoolCreation {
                size,
                reason: "pool size must be positive".to_string(),
            });
        }
        if size > Semaphore::MAX_PERMITS {
            return Err(VolleyError::PoolCreation {
                size,
                reason: format!("pool size exceeds {}", Semaphore::MAX_PERMITS),
            });
        }

        Ok(Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks spawned and not yet collected
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Launch `task` immediately; it waits for a free slot before running
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            // the semaphore is never closed while the pool owns its tasks
            let _permit = permits.acquire_owned().await;
            task.await
        });
    }

    /// Gather results until every task finished or `deadline` passed
    pub async fn collect_until(mut self, deadline: Instant) -> Collected<T> {
        let mut completed = Vec::with_capacity(self.tasks.len());
        let mut crashed = 0;

        loop {
            match timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(Ok(value))) => completed.push(value),
                Ok(Some(Err(e))) => {
                    warn!("Worker task ended without a result: {}", e);
                    crashed += 1;
                }
                Ok(None) | Err(_) => break,
            }
        }

        let abandoned = self.tasks.len();
        if abandoned > 0 {
            warn!(
                "Collection deadline passed with {} of {} tasks outstanding; abandoning them",
                abandoned,
                abandoned + completed.len() + crashed
            );
        }

        Collected {
            completed,
            abandoned,
            crashed,
        }
    }
}

impl<T: 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}
