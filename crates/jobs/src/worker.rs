//! Worker pool draining due jobs into a handler.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{JobError, QueueError};
use crate::job::Job;
use crate::queue::JobQueue;

/// Executes a popped job.
///
/// Implementations must be idempotent under at-least-once delivery: the same
/// job may be handed over more than once after a crash or a retried nack.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handles one job. A `Transient` error triggers the queue's backoff;
    /// a `Permanent` error dead-letters the job.
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

/// A pool of long-running consumers for a delayed-job queue.
pub struct WorkerPool<Q, H> {
    queue: Arc<Q>,
    handler: Arc<H>,
    workers: usize,
}

impl<Q, H> WorkerPool<Q, H>
where
    Q: JobQueue + 'static,
    H: JobHandler + 'static,
{
    /// Creates a pool with the given consumer count.
    pub fn new(queue: Arc<Q>, handler: Arc<H>, workers: usize) -> Self {
        Self {
            queue,
            handler,
            workers,
        }
    }

    /// Spawns the consumers and returns a handle for graceful shutdown.
    pub fn spawn(self) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(self.workers);

        for worker in 0..self.workers {
            let queue = Arc::clone(&self.queue);
            let handler = Arc::clone(&self.handler);
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                run_worker(worker, queue, handler, shutdown).await;
            }));
        }

        WorkerPoolHandle {
            shutdown_tx,
            handles,
        }
    }
}

async fn run_worker<Q: JobQueue, H: JobHandler>(
    worker: usize,
    queue: Arc<Q>,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker, "job worker started");
    loop {
        let job = tokio::select! {
            changed = shutdown.changed() => {
                let _ = changed;
                tracing::debug!(worker, "job worker shutting down");
                return;
            }
            job = queue.next_due() => job,
        };

        let job = match job {
            Ok(job) => job,
            Err(QueueError::Closed) => {
                tracing::debug!(worker, "job queue closed, worker exiting");
                return;
            }
        };

        tracing::info!(
            worker,
            job_id = %job.id,
            kind = %job.kind,
            order_id = %job.order_id,
            attempt = job.attempt,
            "job picked up"
        );
        metrics::counter!("jobs_picked_total").increment(1);

        match handler.handle(&job).await {
            Ok(()) => {
                tracing::info!(worker, job_id = %job.id, "job completed");
                metrics::counter!("jobs_completed_total").increment(1);
            }
            Err(err) => {
                tracing::warn!(worker, job_id = %job.id, %err, "job handler failed");
                if let Err(nack_err) = queue.nack(job, &err).await {
                    tracing::error!(worker, %nack_err, "failed to nack job");
                }
            }
        }
    }
}

/// Handle to a spawned worker pool.
pub struct WorkerPoolHandle {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Signals shutdown and waits for all consumers to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
