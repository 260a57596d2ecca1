//! In-memory storage implementation for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, StoreId, UserId, VoucherId};
use domain::OrderStatus;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::entities::{
    OrderItemRecord, OrderRecord, ProductRecord, StockJournalRecord, StoreInventoryRecord,
    VoucherRecord,
};
use crate::store::{Storage, StorageTx};
use crate::{Result, StorageError};

#[derive(Debug, Clone, Default)]
struct MemState {
    products: HashMap<ProductId, ProductRecord>,
    orders: HashMap<OrderId, OrderRecord>,
    order_items: HashMap<OrderId, Vec<OrderItemRecord>>,
    inventory: HashMap<(StoreId, ProductId), u32>,
    journal: Vec<StockJournalRecord>,
    vouchers: HashMap<VoucherId, VoucherRecord>,
}

/// In-memory storage backend.
///
/// A transaction takes the single state lock for its whole lifetime and
/// mutates a staged copy, so transactions are strictly serializable: the
/// strongest reading of the row-locking contract the engine relies on.
/// Commit publishes the staged copy; dropping the transaction discards it.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<MemState>>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a product. Test/dev helper; products are administered out of band.
    pub async fn seed_product(&self, product: ProductRecord) {
        self.state
            .lock()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    /// Seeds a voucher. Test/dev helper.
    pub async fn seed_voucher(&self, voucher: VoucherRecord) {
        self.state.lock().await.vouchers.insert(voucher.id, voucher);
    }

    /// Sets a raw stock level, bypassing the ledger. Test/dev helper only;
    /// engine code must mutate stock through the inventory ledger.
    pub async fn set_stock(&self, store_id: StoreId, product_id: ProductId, quantity: u32) {
        self.state
            .lock()
            .await
            .inventory
            .insert((store_id, product_id), quantity);
    }

    /// Returns the number of journal entries. Test helper.
    pub async fn journal_len(&self) -> usize {
        self.state.lock().await.journal.len()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self) -> Result<Box<dyn StorageTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            staged,
        }))
    }

    async fn order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItemRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .order_items
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn product(&self, id: &ProductId) -> Result<Option<ProductRecord>> {
        Ok(self.state.lock().await.products.get(id).cloned())
    }

    async fn inventory(
        &self,
        store_id: StoreId,
        product_id: &ProductId,
    ) -> Result<Option<StoreInventoryRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .inventory
            .get(&(store_id, product_id.clone()))
            .map(|&quantity| StoreInventoryRecord {
                store_id,
                product_id: product_id.clone(),
                quantity,
            }))
    }

    async fn journal(
        &self,
        store_id: StoreId,
        product_id: &ProductId,
    ) -> Result<Vec<StockJournalRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .journal
            .iter()
            .filter(|e| e.store_id == store_id && &e.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn voucher_by_code(&self, code: &str) -> Result<Option<VoucherRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .vouchers
            .values()
            .find(|v| v.code == code)
            .cloned())
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<MemState>,
    staged: MemState,
}

#[async_trait]
impl StorageTx for InMemoryTx {
    async fn product(&mut self, id: &ProductId) -> Result<Option<ProductRecord>> {
        Ok(self.staged.products.get(id).cloned())
    }

    async fn inventory_for_update(
        &mut self,
        store_id: StoreId,
        product_id: &ProductId,
    ) -> Result<Option<StoreInventoryRecord>> {
        Ok(self
            .staged
            .inventory
            .get(&(store_id, product_id.clone()))
            .map(|&quantity| StoreInventoryRecord {
                store_id,
                product_id: product_id.clone(),
                quantity,
            }))
    }

    async fn upsert_inventory(&mut self, row: &StoreInventoryRecord) -> Result<()> {
        self.staged
            .inventory
            .insert((row.store_id, row.product_id.clone()), row.quantity);
        Ok(())
    }

    async fn append_journal(&mut self, entry: &StockJournalRecord) -> Result<()> {
        self.staged.journal.push(entry.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        if self.staged.orders.contains_key(&order.id) {
            return Err(StorageError::Corrupt(format!(
                "duplicate order id: {}",
                order.id
            )));
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItemRecord]) -> Result<()> {
        for item in items {
            self.staged
                .order_items
                .entry(item.order_id)
                .or_default()
                .push(item.clone());
        }
        Ok(())
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.staged.orders.get(&id).cloned())
    }

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItemRecord>> {
        Ok(self.staged.order_items.get(&id).cloned().unwrap_or_default())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let order = self
            .staged
            .orders
            .get_mut(&id)
            .ok_or_else(|| StorageError::Corrupt(format!("update of unknown order: {id}")))?;
        order.status = status;
        order.updated_at = updated_at;
        Ok(())
    }

    async fn voucher_by_code_for_update(&mut self, code: &str) -> Result<Option<VoucherRecord>> {
        Ok(self
            .staged
            .vouchers
            .values()
            .find(|v| v.code == code)
            .cloned())
    }

    async fn vouchers_used_between(
        &mut self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VoucherRecord>> {
        Ok(self
            .staged
            .vouchers
            .values()
            .filter(|v| {
                v.user_id == user_id
                    && v.used
                    && v.used_at.is_some_and(|at| at >= from && at <= to)
            })
            .cloned()
            .collect())
    }

    async fn update_voucher(&mut self, voucher: &VoucherRecord) -> Result<()> {
        self.staged.vouchers.insert(voucher.id, voucher.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Dropping the staged copy is the rollback.
        Ok(())
    }
}
