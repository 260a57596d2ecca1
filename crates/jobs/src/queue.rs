//! Delayed-job queue contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

use crate::error::{JobError, QueueError};
use crate::job::{Job, JobId};

/// Retry behaviour for failed jobs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before a job is dead-lettered.
    pub max_attempts: u32,
    /// First retry delay; doubles on every further retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Returns the delay before the given attempt number runs.
    fn backoff_delay(&self, next_attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(next_attempt.saturating_sub(2))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

/// Contract of the durable delayed-job collaborator.
///
/// Delivery is at-least-once: a popped job that fails must be [`nack`]ed so
/// the queue can retry or dead-letter it; the queue never silently drops
/// work. Cancellation only reaches jobs still pending; for a job already
/// picked up, the state-machine guard on the transition is the correctness
/// net.
///
/// [`nack`]: JobQueue::nack
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a job to run after `delay`. Enqueueing an id that is already
    /// pending replaces the earlier timer (dedup by identity).
    async fn enqueue(&self, job: Job, delay: Duration) -> Result<(), QueueError>;

    /// Removes a pending job before execution. Returns true if the job was
    /// still pending.
    async fn cancel(&self, id: &JobId) -> Result<bool, QueueError>;

    /// Waits until a job is due and pops it.
    async fn next_due(&self) -> Result<Job, QueueError>;

    /// Reports a failed execution. Transient failures are re-enqueued with
    /// exponential backoff until the retry policy is exhausted; everything
    /// else lands in the dead-letter store.
    async fn nack(&self, job: Job, error: &JobError) -> Result<(), QueueError>;
}

#[derive(Debug, Default)]
struct QueueState {
    pending: HashMap<JobId, (Job, Instant)>,
    dead: Vec<Job>,
    closed: bool,
}

/// In-memory delayed-job queue for tests and local development.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    policy: RetryPolicy,
}

impl InMemoryJobQueue {
    /// Creates a queue with the default retry policy.
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    /// Creates a queue with an explicit retry policy.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            policy,
        }
    }

    /// Closes the queue; blocked consumers return [`QueueError::Closed`].
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.notify.notify_waiters();
    }

    /// Returns the number of pending jobs. Test helper.
    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Returns true if a job with the given id is pending. Test helper.
    pub fn has_pending(&self, id: &JobId) -> bool {
        self.state.lock().unwrap().pending.contains_key(id)
    }

    /// Returns the number of dead-lettered jobs. Test helper.
    pub fn dead_letter_count(&self) -> usize {
        self.state.lock().unwrap().dead.len()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(QueueError::Closed);
            }
            let due = Instant::now() + delay;
            if state.pending.insert(job.id.clone(), (job, due)).is_some() {
                tracing::debug!("pending job replaced by re-schedule");
            }
        }
        metrics::counter!("jobs_enqueued_total").increment(1);
        self.notify.notify_one();
        Ok(())
    }

    async fn cancel(&self, id: &JobId) -> Result<bool, QueueError> {
        let removed = self.state.lock().unwrap().pending.remove(id).is_some();
        if removed {
            metrics::counter!("jobs_cancelled_total").increment(1);
        }
        Ok(removed)
    }

    async fn next_due(&self) -> Result<Job, QueueError> {
        loop {
            let earliest = {
                let mut state = self.state.lock().unwrap();
                if state.closed {
                    return Err(QueueError::Closed);
                }
                let now = Instant::now();
                let due_id = state
                    .pending
                    .iter()
                    .filter(|(_, (_, due))| *due <= now)
                    .min_by_key(|(_, (_, due))| *due)
                    .map(|(id, _)| id.clone());
                if let Some(id) = due_id {
                    let (job, _) = state.pending.remove(&id).unwrap();
                    return Ok(job);
                }
                state.pending.values().map(|(_, due)| *due).min()
            };

            match earliest {
                Some(due) => {
                    tokio::select! {
                        () = tokio::time::sleep_until(due) => {}
                        () = self.notify.notified() => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn nack(&self, mut job: Job, error: &JobError) -> Result<(), QueueError> {
        let retry = matches!(error, JobError::Transient(_)) && job.attempt < self.policy.max_attempts;

        if retry {
            job.attempt += 1;
            let delay = self.policy.backoff_delay(job.attempt);
            tracing::warn!(
                job_id = %job.id,
                attempt = job.attempt,
                delay_secs = delay.as_secs(),
                %error,
                "job failed, retrying with backoff"
            );
            metrics::counter!("jobs_retried_total").increment(1);
            return self.enqueue(job, delay).await;
        }

        tracing::error!(
            job_id = %job.id,
            attempt = job.attempt,
            %error,
            "job dead-lettered"
        );
        metrics::counter!("jobs_dead_lettered_total").increment(1);
        self.state.lock().unwrap().dead.push(job);
        Ok(())
    }
}
