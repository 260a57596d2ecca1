//! Persisted entity records.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, StoreId, UserId, VoucherId};
use domain::{Actor, Money, OrderStatus, PaymentMethod};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable product. Administered out of band; checkout only reads the
/// current price and the active flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    /// Current unit price; order items snapshot it at creation time.
    pub price: Money,
    pub active: bool,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub store_id: StoreId,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub discount_total: Money,
    pub grand_total: Money,
    /// Total quantity across all lines.
    pub total_items: u32,
    pub payment_method: PaymentMethod,
    /// Unpaid orders are auto-cancelled at this instant.
    pub payment_deadline_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Checks the monetary invariant `grand = subtotal - discount + shipping`.
    pub fn totals_consistent(&self) -> bool {
        self.grand_total == self.subtotal - self.discount_total + self.shipping_cost
            && !self.subtotal.is_negative()
            && !self.shipping_cost.is_negative()
            && !self.discount_total.is_negative()
            && !self.grand_total.is_negative()
    }
}

/// A line of an order with its immutable price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Product name at the time of ordering.
    pub product_name: String,
    /// Unit price captured at creation; never re-read from the live product.
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderItemRecord {
    /// Returns the line total (snapshot price × quantity).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Stock level of one product at one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInventoryRecord {
    pub store_id: StoreId,
    pub product_id: ProductId,
    /// Never negative.
    pub quantity: u32,
}

/// Why a stock quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalReason {
    /// Stock received into the store (goods-in, restock, rollback restore).
    Add,
    /// Stock removed from the store (checkout reservation, shrinkage).
    Remove,
    /// Stock arriving from another store.
    TransferIn,
    /// Stock leaving for another store.
    TransferOut,
    /// Reserved against an order (alias of Remove in this system).
    Reserve,
    /// Reservation released (alias of Add in this system).
    Release,
}

impl JournalReason {
    /// Returns the reason name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalReason::Add => "add",
            JournalReason::Remove => "remove",
            JournalReason::TransferIn => "transfer_in",
            JournalReason::TransferOut => "transfer_out",
            JournalReason::Reserve => "reserve",
            JournalReason::Release => "release",
        }
    }
}

impl std::str::FromStr for JournalReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(JournalReason::Add),
            "remove" => Ok(JournalReason::Remove),
            "transfer_in" => Ok(JournalReason::TransferIn),
            "transfer_out" => Ok(JournalReason::TransferOut),
            "reserve" => Ok(JournalReason::Reserve),
            "release" => Ok(JournalReason::Release),
            other => Err(format!("unknown journal reason: {other}")),
        }
    }
}

/// One append-only stock movement. Never mutated or deleted; this is the
/// audit trail of truth for stock reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockJournalRecord {
    pub id: Uuid,
    pub store_id: StoreId,
    pub product_id: ProductId,
    /// Signed quantity change; negative for outbound movements.
    pub delta: i64,
    pub reason: JournalReason,
    pub actor: Actor,
    pub recorded_at: DateTime<Utc>,
}

impl StockJournalRecord {
    /// Creates a journal entry stamped with the given instant.
    pub fn new(
        store_id: StoreId,
        product_id: ProductId,
        delta: i64,
        reason: JournalReason,
        actor: Actor,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id,
            product_id,
            delta,
            reason,
            actor,
            recorded_at,
        }
    }
}

/// A promotional voucher. Consumed at checkout; cancellation reactivates
/// vouchers used near the order's creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub id: VoucherId,
    pub code: String,
    pub user_id: UserId,
    pub amount: Money,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}
