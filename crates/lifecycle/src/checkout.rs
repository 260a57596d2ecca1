//! Checkout orchestration: from a submitted cart to a durable order.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use common::{OrderId, ProductId, StoreId, UserId};
use domain::{Actor, DeliveryDetails, ItemRequest, Money, OrderStatus, PaymentMethod, ShippingMethod};
use jobs::{JobQueue, TransitionScheduler};
use serde::{Deserialize, Serialize};
use storage::{OrderItemRecord, OrderRecord, Storage};

use crate::error::{LifecycleError, Result, ValidationError};
use crate::idempotency::{Acquisition, IdempotencyRegistry};
use crate::ledger;
use crate::stores::StoreResolver;

/// Checkout tuning knobs.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Interval from creation to the payment deadline.
    pub payment_deadline: Duration,
    /// Flat courier fee; pickup is free.
    pub courier_fee: Money,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            payment_deadline: Duration::minutes(60),
            courier_fee: Money::from_minor(1_500),
        }
    }
}

/// A checkout submission.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub items: Vec<ItemRequest>,
    pub delivery: DeliveryDetails,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    /// Optional promotional voucher, consumed atomically with the order.
    pub voucher_code: Option<String>,
    /// Client-supplied dedup token; see [`IdempotencyRegistry`].
    pub idempotency_key: Option<String>,
}

/// The created (or idempotently replayed) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order: OrderRecord,
    pub items: Vec<OrderItemRecord>,
}

/// Orchestrates order creation.
///
/// Owns Order/OrderItem creation exclusively. Stock reservation, price
/// snapshotting, voucher consumption, and the order insert all happen in one
/// transaction; the auto-cancel timer is armed only after commit, because
/// the job queue is a separate system with no transactional coupling to the
/// database.
pub struct CheckoutService<S, Q, R> {
    storage: S,
    scheduler: TransitionScheduler<Q>,
    resolver: R,
    idempotency: IdempotencyRegistry<CheckoutReceipt>,
    config: CheckoutConfig,
}

impl<S, Q, R> CheckoutService<S, Q, R>
where
    S: Storage,
    Q: JobQueue,
    R: StoreResolver,
{
    /// Creates a checkout service.
    pub fn new(
        storage: S,
        scheduler: TransitionScheduler<Q>,
        resolver: R,
        idempotency: IdempotencyRegistry<CheckoutReceipt>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            storage,
            scheduler,
            resolver,
            idempotency,
            config,
        }
    }

    /// Creates an order from a checkout submission.
    ///
    /// With an idempotency key, duplicate submissions converge on a single
    /// executed attempt and identical receipts; a failed attempt evicts the
    /// key so the client can retry.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_order(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        metrics::counter!("checkout_attempts_total").increment(1);

        let Some(key) = request.idempotency_key.clone() else {
            return self.create_order_uncached(&request).await;
        };

        match self.idempotency.acquire(&key).await {
            Acquisition::Replayed(receipt) => {
                metrics::counter!("checkout_idempotent_replays_total").increment(1);
                tracing::info!(order_id = %receipt.order.id, "checkout replayed from idempotency key");
                Ok(receipt)
            }
            Acquisition::Failed => Err(LifecycleError::IdempotentAttemptFailed),
            Acquisition::New(permit) => match self.create_order_uncached(&request).await {
                Ok(receipt) => {
                    permit.complete(receipt.clone());
                    Ok(receipt)
                }
                Err(err) => {
                    permit.release();
                    Err(err)
                }
            },
        }
    }

    async fn create_order_uncached(&self, request: &CheckoutRequest) -> Result<CheckoutReceipt> {
        let started = std::time::Instant::now();
        let lines = merge_lines(&request.items)?;
        let store_id = self.resolve_store(&request.delivery).await?;

        let order_id = OrderId::new();
        let now = Utc::now();
        let mut tx = self.storage.begin().await?;

        // Snapshot prices from the live products at call time; the snapshot
        // is immutable for the life of the order.
        let mut items = Vec::with_capacity(lines.len());
        for (product_id, quantity) in &lines {
            let product = tx
                .product(product_id)
                .await?
                .ok_or_else(|| ValidationError::UnknownProduct {
                    product_id: product_id.clone(),
                })?;
            if !product.active {
                return Err(ValidationError::InactiveProduct {
                    product_id: product_id.clone(),
                }
                .into());
            }
            items.push(OrderItemRecord {
                order_id,
                product_id: product_id.clone(),
                product_name: product.name,
                unit_price: product.price,
                quantity: *quantity,
            });
        }

        ledger::reserve(
            tx.as_mut(),
            store_id,
            &lines,
            Actor::User(request.user_id),
            now,
        )
        .await?;

        let subtotal: Money = items.iter().map(OrderItemRecord::line_total).sum();
        let discount_total = match &request.voucher_code {
            Some(code) => self.consume_voucher(tx.as_mut(), code, subtotal, now).await?,
            None => Money::zero(),
        };
        let shipping_cost = match request.shipping_method {
            ShippingMethod::Pickup => Money::zero(),
            ShippingMethod::Courier => self.config.courier_fee,
        };
        let grand_total = subtotal.saturating_sub(discount_total) + shipping_cost;

        let order = OrderRecord {
            id: order_id,
            user_id: request.user_id,
            store_id,
            status: OrderStatus::PendingPayment,
            subtotal,
            shipping_cost,
            discount_total,
            grand_total,
            total_items: lines.iter().map(|(_, qty)| *qty).sum(),
            payment_method: request.payment_method,
            payment_deadline_at: now + self.config.payment_deadline,
            created_at: now,
            updated_at: now,
        };
        tx.insert_order(&order).await?;
        tx.insert_order_items(&items).await?;
        tx.commit().await?;

        // Arm the auto-cancel timer only after the order is durable. A
        // scheduling failure leaves a pending order without its timer, which
        // operators resolve from the log; it must not fail the checkout.
        let deadline = self
            .config
            .payment_deadline
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        if let Err(err) = self.scheduler.schedule_auto_cancel(order_id, deadline).await {
            tracing::error!(%order_id, %err, "failed to arm auto-cancel timer");
        }

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            %order_id,
            %store_id,
            grand_total = %order.grand_total,
            total_items = order.total_items,
            "order created"
        );

        Ok(CheckoutReceipt { order, items })
    }

    async fn resolve_store(&self, delivery: &DeliveryDetails) -> Result<StoreId> {
        if let Some(store_id) = delivery.store_id {
            return Ok(store_id);
        }
        self.resolver
            .resolve(delivery)
            .await
            .ok_or_else(|| ValidationError::StoreUnresolved.into())
    }

    async fn consume_voucher(
        &self,
        tx: &mut dyn storage::StorageTx,
        code: &str,
        subtotal: Money,
        now: chrono::DateTime<Utc>,
    ) -> Result<Money> {
        let mut voucher = tx
            .voucher_by_code_for_update(code)
            .await?
            .ok_or_else(|| ValidationError::UnknownVoucher {
                code: code.to_string(),
            })?;
        if voucher.used {
            return Err(ValidationError::VoucherAlreadyUsed {
                code: code.to_string(),
            }
            .into());
        }

        voucher.used = true;
        voucher.used_at = Some(now);
        tx.update_voucher(&voucher).await?;

        // A voucher larger than the cart discounts at most the subtotal.
        Ok(voucher.amount.min(subtotal))
    }
}

/// Validates quantities and merges duplicate product lines, keeping a stable
/// order for deterministic reservation and error reporting.
fn merge_lines(items: &[ItemRequest]) -> Result<Vec<(ProductId, u32)>> {
    if items.is_empty() {
        return Err(ValidationError::EmptyOrder.into());
    }

    let mut merged: BTreeMap<String, (ProductId, u32)> = BTreeMap::new();
    for item in items {
        if item.quantity == 0 {
            return Err(ValidationError::InvalidQuantity {
                product_id: item.product_id.clone(),
            }
            .into());
        }
        merged
            .entry(item.product_id.as_str().to_string())
            .and_modify(|(_, qty)| *qty += item.quantity)
            .or_insert((item.product_id.clone(), item.quantity));
    }
    Ok(merged.into_values().collect())
}
