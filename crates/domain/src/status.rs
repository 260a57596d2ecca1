//! Order lifecycle state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// PendingPayment ──► PaymentReview ──► Processing ──► Shipped ──► Confirmed
///       │                  │               │
///       └──────────────────┴───────────────┴──► Cancelled
/// ```
///
/// User cancellation is only possible from `PendingPayment`; admins may also
/// cancel from `PaymentReview` and `Processing`. `Confirmed` and `Cancelled`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created, stock reserved, waiting for payment before the deadline.
    #[default]
    PendingPayment,

    /// Payment proof accepted, awaiting manual confirmation.
    PaymentReview,

    /// Payment confirmed, order is being picked and packed.
    Processing,

    /// Order handed to the courier.
    Shipped,

    /// Delivery confirmed by the customer or the dwell timer (terminal).
    Confirmed,

    /// Order was cancelled and its side effects rolled back (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if a payment proof / gateway notification can be accepted.
    pub fn can_accept_payment(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true if payment can be confirmed (review passed).
    pub fn can_confirm_payment(&self) -> bool {
        matches!(self, OrderStatus::PaymentReview)
    }

    /// Returns true if the order can be shipped.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if delivery can be confirmed.
    pub fn can_confirm_delivery(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if a customer may cancel in this status.
    pub fn user_can_cancel(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true if an admin may cancel in this status.
    pub fn admin_can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::PendingPayment | OrderStatus::PaymentReview | OrderStatus::Processing
        )
    }

    /// Returns true if this is a terminal status (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Cancelled)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::PaymentReview => "payment_review",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(OrderStatus::PendingPayment),
            "payment_review" => Ok(OrderStatus::PaymentReview),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);
