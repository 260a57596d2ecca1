//! Lifecycle error taxonomy.
//!
//! `ValidationError` is bad input and never retried. `Conflict` means the
//! order has moved past the expected state. Storage and queue failures are
//! transient from the job workers' point of view and retried with backoff.

use common::{OrderId, ProductId};
use domain::OrderStatus;
use jobs::QueueError;
use storage::StorageError;
use thiserror::Error;

/// Rejected input, surfaced to the caller with a machine-readable reason.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Checkout with no items.
    #[error("order has no items")]
    EmptyOrder,

    /// A line with a zero quantity.
    #[error("invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    /// The product does not exist.
    #[error("unknown product: {product_id}")]
    UnknownProduct { product_id: ProductId },

    /// The product exists but is not sellable.
    #[error("product is not available: {product_id}")]
    InactiveProduct { product_id: ProductId },

    /// The target store does not stock the product at all.
    #[error("product {product_id} is not stocked at this store")]
    NoInventory { product_id: ProductId },

    /// Not enough stock to cover the requested quantity.
    #[error("insufficient stock for product {product_id}. Available: {available}")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
    },

    /// No store serves the delivery point.
    #[error("no store within service radius of the delivery address")]
    StoreUnresolved,

    /// The voucher code does not exist.
    #[error("unknown voucher code: {code}")]
    UnknownVoucher { code: String },

    /// The voucher was already consumed.
    #[error("voucher already used: {code}")]
    VoucherAlreadyUsed { code: String },
}

/// Errors surfaced by the order lifecycle engine.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Input rejected; not retried.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The order is not in the state the operation requires.
    #[error("cannot {action} order {order_id} in status {current}")]
    Conflict {
        order_id: OrderId,
        action: &'static str,
        current: OrderStatus,
    },

    /// Unknown order.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// A concurrent request holding the same idempotency key failed; the
    /// caller should retry, which will start a fresh attempt.
    #[error("concurrent request with the same idempotency key failed")]
    IdempotentAttemptFailed,

    /// Auto-confirm fired before the dwell period elapsed; retried by the
    /// queue's backoff rather than a second timer.
    #[error("auto-confirm fired before the dwell period elapsed")]
    PrematureAutoConfirm,

    /// Storage failure (transient).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Job queue failure (transient).
    #[error("job queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Convenience type alias for lifecycle results.
pub type Result<T> = std::result::Result<T, LifecycleError>;
