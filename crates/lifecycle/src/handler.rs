//! Bridges popped delayed jobs onto the fulfillment state machine.

use std::sync::Arc;

use async_trait::async_trait;
use jobs::{Job, JobError, JobHandler, JobKind, JobQueue};
use storage::Storage;

use crate::error::LifecycleError;
use crate::fulfillment::{FulfillmentService, TransitionOutcome};

/// Executes `auto-cancel` and `auto-confirm` jobs against the fulfillment
/// service, translating its errors into the queue's retry vocabulary.
pub struct TransitionJobHandler<S, Q> {
    fulfillment: Arc<FulfillmentService<S, Q>>,
}

impl<S, Q> TransitionJobHandler<S, Q> {
    /// Creates a handler over the given fulfillment service.
    pub fn new(fulfillment: Arc<FulfillmentService<S, Q>>) -> Self {
        Self { fulfillment }
    }
}

#[async_trait]
impl<S, Q> JobHandler for TransitionJobHandler<S, Q>
where
    S: Storage,
    Q: JobQueue,
{
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let outcome = match job.kind {
            JobKind::AutoCancel => self.fulfillment.auto_cancel(job.order_id).await,
            JobKind::AutoConfirm => self.fulfillment.auto_confirm(job.order_id).await,
        };

        match outcome {
            Ok(TransitionOutcome::Applied) => Ok(()),
            Ok(TransitionOutcome::Skipped { current }) => {
                // Already handled by an earlier delivery or a manual action.
                tracing::info!(job_id = %job.id, %current, "transition job skipped");
                Ok(())
            }
            Err(err @ LifecycleError::PrematureAutoConfirm) => {
                Err(JobError::Transient(err.to_string()))
            }
            Err(err @ LifecycleError::Storage(_)) => Err(JobError::Transient(err.to_string())),
            Err(err @ LifecycleError::Queue(_)) => Err(JobError::Transient(err.to_string())),
            Err(err @ LifecycleError::OrderNotFound(_)) => {
                Err(JobError::Permanent(err.to_string()))
            }
            Err(err) => Err(JobError::Permanent(err.to_string())),
        }
    }
}
