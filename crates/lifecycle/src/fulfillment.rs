//! Guarded order status transitions.
//!
//! This service exclusively owns `Order.status`. Every operation loads the
//! order under a row lock, checks the exact persisted pre-state, and commits
//! the flip atomically with whatever side effects belong to it (rollback on
//! cancellation). Job-triggered transitions report a mismatch as
//! [`TransitionOutcome::Skipped`] rather than an error, which makes them
//! idempotent under at-least-once delivery; user/admin actions surface a
//! conflict instead.

use chrono::{Duration, Utc};
use common::OrderId;
use domain::{Actor, OrderStatus};
use jobs::{JobQueue, TransitionScheduler};
use storage::{OrderRecord, Storage};

use crate::error::{LifecycleError, Result};
use crate::rollback;

/// Timing knobs for the delayed transitions.
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// How long a shipped order dwells before auto-confirmation.
    pub confirm_dwell: Duration,
    /// Half-width of the voucher-reactivation window around order creation.
    pub voucher_window: Duration,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            confirm_dwell: Duration::days(7),
            voucher_window: Duration::hours(6),
        }
    }
}

/// What a job-triggered transition did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The guard matched and the transition was committed.
    Applied,
    /// The order had already moved on; nothing was touched.
    Skipped { current: OrderStatus },
}

/// Applies status transitions to orders.
pub struct FulfillmentService<S, Q> {
    storage: S,
    scheduler: TransitionScheduler<Q>,
    config: FulfillmentConfig,
}

impl<S, Q> FulfillmentService<S, Q>
where
    S: Storage,
    Q: JobQueue,
{
    /// Creates a fulfillment service.
    pub fn new(storage: S, scheduler: TransitionScheduler<Q>, config: FulfillmentConfig) -> Self {
        Self {
            storage,
            scheduler,
            config,
        }
    }

    /// Accepts a payment proof or a verified gateway notification:
    /// `PendingPayment → PaymentReview`. Disarms the pending auto-cancel
    /// timer; if the timer already fired concurrently, its `PendingPayment`
    /// guard is the backstop.
    #[tracing::instrument(skip(self))]
    pub async fn accept_payment(&self, order_id: OrderId) -> Result<OrderRecord> {
        let order = self
            .transition(order_id, "accept payment for", |status| {
                status.can_accept_payment()
            }, OrderStatus::PaymentReview)
            .await?;

        if self.scheduler.cancel_auto_cancel(order_id).await? {
            tracing::info!(%order_id, "auto-cancel disarmed after payment");
        }
        metrics::counter!("orders_payment_accepted_total").increment(1);
        Ok(order)
    }

    /// Confirms a reviewed payment: `PaymentReview → Processing`.
    ///
    /// Distinct from [`confirm_delivery`](Self::confirm_delivery); the two
    /// confirmations guard different pre-states and must not be conflated.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, order_id: OrderId) -> Result<OrderRecord> {
        let order = self
            .transition(order_id, "confirm payment for", |status| {
                status.can_confirm_payment()
            }, OrderStatus::Processing)
            .await?;
        metrics::counter!("orders_payment_confirmed_total").increment(1);
        Ok(order)
    }

    /// Hands the order to the courier: `Processing → Shipped`. Schedules the
    /// auto-confirm timer after commit.
    #[tracing::instrument(skip(self))]
    pub async fn ship(&self, order_id: OrderId) -> Result<OrderRecord> {
        let order = self
            .transition(order_id, "ship", |status| status.can_ship(), OrderStatus::Shipped)
            .await?;

        let dwell = self
            .config
            .confirm_dwell
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        self.scheduler.schedule_auto_confirm(order_id, dwell).await?;

        metrics::counter!("orders_shipped_total").increment(1);
        Ok(order)
    }

    /// Customer confirms receipt: `Shipped → Confirmed`. Removes the pending
    /// auto-confirm timer.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_delivery(&self, order_id: OrderId) -> Result<OrderRecord> {
        let order = self
            .transition(order_id, "confirm delivery of", |status| {
                status.can_confirm_delivery()
            }, OrderStatus::Confirmed)
            .await?;

        self.scheduler.cancel_auto_confirm(order_id).await?;
        metrics::counter!("orders_confirmed_total").increment(1);
        Ok(order)
    }

    /// Cancels an order on behalf of `actor`, rolling back its side effects
    /// in the same transaction as the status flip.
    ///
    /// Customers may cancel only while the order is unpaid; admins may also
    /// cancel during review and processing.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: OrderId,
        actor: Actor,
        reason: Option<&str>,
    ) -> Result<OrderRecord> {
        let mut tx = self.storage.begin().await?;
        let mut order = tx
            .order_for_update(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        let allowed = if actor.is_admin() {
            order.status.admin_can_cancel()
        } else {
            order.status.user_can_cancel()
        };
        if !allowed {
            return Err(LifecycleError::Conflict {
                order_id,
                action: "cancel",
                current: order.status,
            });
        }

        let now = Utc::now();
        let items = tx.order_items(order_id).await?;
        rollback::rollback(
            tx.as_mut(),
            &order,
            &items,
            actor,
            self.config.voucher_window,
            now,
        )
        .await?;
        tx.update_order_status(order_id, OrderStatus::Cancelled, now)
            .await?;
        tx.commit().await?;

        order.status = OrderStatus::Cancelled;
        order.updated_at = now;

        self.scheduler.cancel_auto_cancel(order_id).await?;
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, %actor, reason, "order cancelled");
        Ok(order)
    }

    /// Job-triggered cancellation at the payment deadline. Fires only while
    /// the order is still exactly `PendingPayment`; anything else is a
    /// skip, leaving status, stock, and journal untouched.
    #[tracing::instrument(skip(self))]
    pub async fn auto_cancel(&self, order_id: OrderId) -> Result<TransitionOutcome> {
        let mut tx = self.storage.begin().await?;
        let order = tx
            .order_for_update(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::PendingPayment {
            tracing::info!(%order_id, current = %order.status, "auto-cancel skipped");
            metrics::counter!("jobs_skipped_total", "kind" => "auto-cancel").increment(1);
            return Ok(TransitionOutcome::Skipped {
                current: order.status,
            });
        }

        let now = Utc::now();
        let items = tx.order_items(order_id).await?;
        rollback::rollback(
            tx.as_mut(),
            &order,
            &items,
            Actor::System,
            self.config.voucher_window,
            now,
        )
        .await?;
        tx.update_order_status(order_id, OrderStatus::Cancelled, now)
            .await?;
        tx.commit().await?;

        metrics::counter!("orders_auto_cancelled_total").increment(1);
        tracing::info!(%order_id, "unpaid order auto-cancelled at deadline");
        Ok(TransitionOutcome::Applied)
    }

    /// Job-triggered confirmation after the post-shipment dwell. Fires only
    /// while the order is still exactly `Shipped`. A premature firing (the
    /// dwell has not elapsed since the last update) fails transiently so the
    /// queue's backoff re-attempts later.
    #[tracing::instrument(skip(self))]
    pub async fn auto_confirm(&self, order_id: OrderId) -> Result<TransitionOutcome> {
        let mut tx = self.storage.begin().await?;
        let order = tx
            .order_for_update(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::Shipped {
            tracing::info!(%order_id, current = %order.status, "auto-confirm skipped");
            metrics::counter!("jobs_skipped_total", "kind" => "auto-confirm").increment(1);
            return Ok(TransitionOutcome::Skipped {
                current: order.status,
            });
        }

        let now = Utc::now();
        if order.updated_at + self.config.confirm_dwell > now {
            return Err(LifecycleError::PrematureAutoConfirm);
        }

        tx.update_order_status(order_id, OrderStatus::Confirmed, now)
            .await?;
        tx.commit().await?;

        metrics::counter!("orders_auto_confirmed_total").increment(1);
        tracing::info!(%order_id, "shipped order auto-confirmed after dwell");
        Ok(TransitionOutcome::Applied)
    }

    /// Shared guarded single-status flip for the manual transitions.
    async fn transition(
        &self,
        order_id: OrderId,
        action: &'static str,
        guard: impl Fn(OrderStatus) -> bool,
        next: OrderStatus,
    ) -> Result<OrderRecord> {
        let mut tx = self.storage.begin().await?;
        let mut order = tx
            .order_for_update(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        if !guard(order.status) {
            return Err(LifecycleError::Conflict {
                order_id,
                action,
                current: order.status,
            });
        }

        let now = Utc::now();
        tx.update_order_status(order_id, next, now).await?;
        tx.commit().await?;

        tracing::info!(%order_id, from = %order.status, to = %next, "order status advanced");
        order.status = next;
        order.updated_at = now;
        Ok(order)
    }
}
