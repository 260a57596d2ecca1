//! Job queue and handler error types.

use thiserror::Error;

/// Errors surfaced by a job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue has been closed; no further work will be delivered.
    #[error("job queue is closed")]
    Closed,
}

/// How a job execution failed, as reported by a [`crate::JobHandler`].
///
/// Transient failures are re-attempted with backoff; permanent failures go
/// straight to the dead-letter store for operational visibility.
#[derive(Debug, Error)]
pub enum JobError {
    /// Retryable failure (storage or queue unavailability, premature firing).
    #[error("transient job failure: {0}")]
    Transient(String),

    /// Non-retryable failure (e.g. the referenced order does not exist).
    #[error("permanent job failure: {0}")]
    Permanent(String),
}
