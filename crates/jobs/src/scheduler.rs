//! Schedule and cancel the engine's delayed transitions.

use std::sync::Arc;

use common::OrderId;
use tokio::time::Duration;

use crate::error::QueueError;
use crate::job::{Job, JobId, JobKind};
use crate::queue::JobQueue;

/// Schedules the two delayed transitions of the order lifecycle.
///
/// Job identities are deterministic per (kind, order), so re-scheduling is a
/// replace rather than a duplicate, and a pending job can be removed by
/// identity the moment it becomes obsolete (payment proof arrives before the
/// deadline, delivery confirmed manually before the dwell elapses).
pub struct TransitionScheduler<Q> {
    queue: Arc<Q>,
}

impl<Q> Clone for TransitionScheduler<Q> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<Q: JobQueue> TransitionScheduler<Q> {
    /// Creates a scheduler over the given queue.
    pub fn new(queue: Arc<Q>) -> Self {
        Self { queue }
    }

    /// Schedules cancellation of an unpaid order after `delay`.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_auto_cancel(
        &self,
        order_id: OrderId,
        delay: Duration,
    ) -> Result<(), QueueError> {
        self.queue
            .enqueue(Job::new(JobKind::AutoCancel, order_id), delay)
            .await
    }

    /// Removes a pending auto-cancel job. Returns true if one was pending.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_auto_cancel(&self, order_id: OrderId) -> Result<bool, QueueError> {
        self.queue
            .cancel(&JobId::for_order(JobKind::AutoCancel, order_id))
            .await
    }

    /// Schedules confirmation of a shipped order after `delay`.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_auto_confirm(
        &self,
        order_id: OrderId,
        delay: Duration,
    ) -> Result<(), QueueError> {
        self.queue
            .enqueue(Job::new(JobKind::AutoConfirm, order_id), delay)
            .await
    }

    /// Removes a pending auto-confirm job. Returns true if one was pending.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_auto_confirm(&self, order_id: OrderId) -> Result<bool, QueueError> {
        self.queue
            .cancel(&JobId::for_order(JobKind::AutoConfirm, order_id))
            .await
    }
}
