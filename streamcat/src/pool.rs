//! A bounded pool of async workers: `submit` blocks when the pool is at
//! capacity (backpressure), and `join` waits for every submitted job to
//! finish. A shared [`CancellationToken`] lets jobs stop promptly without
//! the pool needing its own shutdown protocol.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Bounded-concurrency job runner.
///
/// Unlike a goroutine pool draining a channel, this is built on a
/// [`Semaphore`] + [`JoinSet`]: `submit` acquires a permit (blocking if the
/// pool is saturated — the same backpressure a full channel would give) and
/// spawns the job, which releases its permit on completion. `join` drains
/// the `JoinSet`. The two give the same externally observable semantics the
/// spec describes: bounded concurrency, non-deterministic execution order,
/// and a `wait()` barrier.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Creates a pool with `workers` concurrent slots (clamped to at least 1)
    /// sharing `cancel`.
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            tasks: JoinSet::new(),
            cancel,
        }
    }

    /// Returns a worker count defaulting to half the available parallelism,
    /// minimum 1.
    pub fn default_worker_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| (n.get() / 2).max(1))
            .unwrap_or(1)
    }

    /// Submits a job. Blocks (awaits) until a slot is free. If the pool's
    /// cancellation token has already fired, the job is not spawned.
    pub async fn submit<F>(&mut self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return;
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        self.tasks.spawn(async move {
            job.await;
            drop(permit);
        });
    }

    /// Waits for every submitted job to complete.
    pub async fn join(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}
