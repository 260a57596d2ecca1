//! Storage traits: transactional unit of work with row-lock semantics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, StoreId, UserId};
use domain::OrderStatus;

use crate::Result;
use crate::entities::{
    OrderItemRecord, OrderRecord, ProductRecord, StockJournalRecord, StoreInventoryRecord,
    VoucherRecord,
};

/// Handle to the persistent relational store.
///
/// Plain read methods see committed state only. All mutation goes through a
/// [`StorageTx`] obtained from [`Storage::begin`]; do not hold a transaction
/// across plain reads on the same backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn StorageTx>>;

    /// Loads an order by ID.
    async fn order(&self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Loads the items of an order.
    async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItemRecord>>;

    /// Loads a product by ID.
    async fn product(&self, id: &ProductId) -> Result<Option<ProductRecord>>;

    /// Loads the stock row for a (store, product) pair.
    async fn inventory(
        &self,
        store_id: StoreId,
        product_id: &ProductId,
    ) -> Result<Option<StoreInventoryRecord>>;

    /// Loads the journal of a (store, product) pair, oldest first.
    async fn journal(
        &self,
        store_id: StoreId,
        product_id: &ProductId,
    ) -> Result<Vec<StockJournalRecord>>;

    /// Loads a voucher by its code.
    async fn voucher_by_code(&self, code: &str) -> Result<Option<VoucherRecord>>;
}

/// One multi-statement ACID transaction.
///
/// `*_for_update` reads lock the touched rows until commit or rollback, so
/// concurrent writers of the same inventory or order row serialize. Dropping
/// the transaction without committing rolls it back.
#[async_trait]
pub trait StorageTx: Send {
    /// Loads a product (no lock; products are not mutated by the engine).
    async fn product(&mut self, id: &ProductId) -> Result<Option<ProductRecord>>;

    /// Loads and locks the stock row for a (store, product) pair.
    async fn inventory_for_update(
        &mut self,
        store_id: StoreId,
        product_id: &ProductId,
    ) -> Result<Option<StoreInventoryRecord>>;

    /// Writes a stock row, creating it if absent.
    async fn upsert_inventory(&mut self, row: &StoreInventoryRecord) -> Result<()>;

    /// Appends a stock journal entry. The journal is append-only.
    async fn append_journal(&mut self, entry: &StockJournalRecord) -> Result<()>;

    /// Inserts a new order row.
    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()>;

    /// Inserts the items of a new order.
    async fn insert_order_items(&mut self, items: &[OrderItemRecord]) -> Result<()>;

    /// Loads and locks an order row.
    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Loads the items of an order.
    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItemRecord>>;

    /// Updates an order's status and `updated_at`.
    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Loads and locks a voucher by its code.
    async fn voucher_by_code_for_update(&mut self, code: &str) -> Result<Option<VoucherRecord>>;

    /// Loads the vouchers a user marked used within a time window.
    async fn vouchers_used_between(
        &mut self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VoucherRecord>>;

    /// Writes back a voucher row.
    async fn update_voucher(&mut self, voucher: &VoucherRecord) -> Result<()>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rolls the transaction back explicitly.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
