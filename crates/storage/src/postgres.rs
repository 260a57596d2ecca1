//! PostgreSQL-backed storage implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, StoreId, UserId, VoucherId};
use domain::{Actor, Money, OrderStatus, PaymentMethod};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::entities::{
    JournalReason, OrderItemRecord, OrderRecord, ProductRecord, StockJournalRecord,
    StoreInventoryRecord, VoucherRecord,
};
use crate::store::{Storage, StorageTx};
use crate::{Result, StorageError};

/// PostgreSQL storage backend.
///
/// Row locking uses `SELECT … FOR UPDATE`; the serializability the engine
/// needs comes from locking the inventory and order rows it read-modifies.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a new PostgreSQL storage over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

fn quantity_from_db(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StorageError::Corrupt(format!("negative quantity: {value}")))
}

fn row_to_product(row: &PgRow) -> Result<ProductRecord> {
    Ok(ProductRecord {
        id: ProductId::new(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        price: Money::from_minor(row.try_get("price")?),
        active: row.try_get("active")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<OrderRecord> {
    let status: String = row.try_get("status")?;
    let payment_method: String = row.try_get("payment_method")?;
    Ok(OrderRecord {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| StorageError::Corrupt(e.to_string()))?,
        subtotal: Money::from_minor(row.try_get("subtotal")?),
        shipping_cost: Money::from_minor(row.try_get("shipping_cost")?),
        discount_total: Money::from_minor(row.try_get("discount_total")?),
        grand_total: Money::from_minor(row.try_get("grand_total")?),
        total_items: quantity_from_db(row.try_get("total_items")?)?,
        payment_method: payment_method
            .parse::<PaymentMethod>()
            .map_err(StorageError::Corrupt)?,
        payment_deadline_at: row.try_get("payment_deadline_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItemRecord> {
    Ok(OrderItemRecord {
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        unit_price: Money::from_minor(row.try_get("unit_price")?),
        quantity: quantity_from_db(row.try_get("quantity")?)?,
    })
}

fn row_to_inventory(row: &PgRow) -> Result<StoreInventoryRecord> {
    Ok(StoreInventoryRecord {
        store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        quantity: quantity_from_db(row.try_get("quantity")?)?,
    })
}

fn row_to_journal(row: &PgRow) -> Result<StockJournalRecord> {
    let reason: String = row.try_get("reason")?;
    let actor: String = row.try_get("actor")?;
    Ok(StockJournalRecord {
        id: row.try_get("id")?,
        store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        delta: row.try_get("delta")?,
        reason: reason
            .parse::<JournalReason>()
            .map_err(StorageError::Corrupt)?,
        actor: actor.parse::<Actor>().map_err(StorageError::Corrupt)?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn row_to_voucher(row: &PgRow) -> Result<VoucherRecord> {
    Ok(VoucherRecord {
        id: VoucherId::from_uuid(row.try_get::<Uuid, _>("id")?),
        code: row.try_get("code")?,
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        amount: Money::from_minor(row.try_get("amount")?),
        used: row.try_get("used")?,
        used_at: row.try_get("used_at")?,
    })
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn begin(&self) -> Result<Box<dyn StorageTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_id",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn product(&self, id: &ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn inventory(
        &self,
        store_id: StoreId,
        product_id: &ProductId,
    ) -> Result<Option<StoreInventoryRecord>> {
        let row = sqlx::query(
            "SELECT * FROM store_inventory WHERE store_id = $1 AND product_id = $2",
        )
        .bind(store_id.as_uuid())
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_inventory).transpose()
    }

    async fn journal(
        &self,
        store_id: StoreId,
        product_id: &ProductId,
    ) -> Result<Vec<StockJournalRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM stock_journal WHERE store_id = $1 AND product_id = $2 \
             ORDER BY recorded_at, id",
        )
        .bind(store_id.as_uuid())
        .bind(product_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_journal).collect()
    }

    async fn voucher_by_code(&self, code: &str) -> Result<Option<VoucherRecord>> {
        let row = sqlx::query("SELECT * FROM vouchers WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_voucher).transpose()
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTx for PostgresTx {
    async fn product(&mut self, id: &ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn inventory_for_update(
        &mut self,
        store_id: StoreId,
        product_id: &ProductId,
    ) -> Result<Option<StoreInventoryRecord>> {
        let row = sqlx::query(
            "SELECT * FROM store_inventory WHERE store_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(store_id.as_uuid())
        .bind(product_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_inventory).transpose()
    }

    async fn upsert_inventory(&mut self, row: &StoreInventoryRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO store_inventory (store_id, product_id, quantity) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (store_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity",
        )
        .bind(row.store_id.as_uuid())
        .bind(row.product_id.as_str())
        .bind(i64::from(row.quantity))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_journal(&mut self, entry: &StockJournalRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO stock_journal (id, store_id, product_id, delta, reason, actor, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id)
        .bind(entry.store_id.as_uuid())
        .bind(entry.product_id.as_str())
        .bind(entry.delta)
        .bind(entry.reason.as_str())
        .bind(entry.actor.to_string())
        .bind(entry.recorded_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, store_id, status, subtotal, shipping_cost, \
             discount_total, grand_total, total_items, payment_method, payment_deadline_at, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.store_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.subtotal.minor())
        .bind(order.shipping_cost.minor())
        .bind(order.discount_total.minor())
        .bind(order.grand_total.minor())
        .bind(i64::from(order.total_items))
        .bind(order.payment_method.as_str())
        .bind(order.payment_deadline_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItemRecord]) -> Result<()> {
        for item in items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, product_name, unit_price, quantity) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_str())
            .bind(&item.product_name)
            .bind(item.unit_price.minor())
            .bind(i64::from(item.quantity))
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_id",
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn voucher_by_code_for_update(&mut self, code: &str) -> Result<Option<VoucherRecord>> {
        let row = sqlx::query("SELECT * FROM vouchers WHERE code = $1 FOR UPDATE")
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_voucher).transpose()
    }

    async fn vouchers_used_between(
        &mut self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VoucherRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM vouchers WHERE user_id = $1 AND used = TRUE \
             AND used_at BETWEEN $2 AND $3 FOR UPDATE",
        )
        .bind(user_id.as_uuid())
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_voucher).collect()
    }

    async fn update_voucher(&mut self, voucher: &VoucherRecord) -> Result<()> {
        sqlx::query("UPDATE vouchers SET used = $2, used_at = $3 WHERE id = $1")
            .bind(voucher.id.as_uuid())
            .bind(voucher.used)
            .bind(voucher.used_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
