//! Inventory ledger: every stock mutation, paired with its journal entry.
//!
//! All callers (checkout, rollback, stock administration) go through this
//! module; nothing else in the workspace touches inventory rows. Every
//! function runs against the caller's open transaction, so stock never
//! diverges from the order state committed alongside it.

use chrono::{DateTime, Utc};
use common::{ProductId, StoreId};
use domain::Actor;
use storage::{JournalReason, StockJournalRecord, StorageTx, StoreInventoryRecord};

use crate::error::{Result, ValidationError};

/// Decrements stock for every `(product, quantity)` pair, appending one
/// `Remove` journal row per pair.
///
/// The decrement is immediate and final at order-creation time; this system
/// has no separate hold/commit step. Any pair failing aborts the whole
/// reservation, since the enclosing transaction is dropped uncommitted.
pub async fn reserve(
    tx: &mut dyn StorageTx,
    store_id: StoreId,
    items: &[(ProductId, u32)],
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<()> {
    for (product_id, quantity) in items {
        let row = tx
            .inventory_for_update(store_id, product_id)
            .await?
            .ok_or_else(|| ValidationError::NoInventory {
                product_id: product_id.clone(),
            })?;

        if row.quantity < *quantity {
            return Err(ValidationError::InsufficientStock {
                product_id: product_id.clone(),
                available: row.quantity,
            }
            .into());
        }

        tx.upsert_inventory(&StoreInventoryRecord {
            quantity: row.quantity - quantity,
            ..row
        })
        .await?;
        tx.append_journal(&StockJournalRecord::new(
            store_id,
            product_id.clone(),
            -i64::from(*quantity),
            JournalReason::Remove,
            actor,
            now,
        ))
        .await?;

        tracing::debug!(%store_id, %product_id, quantity, "stock reserved");
    }
    Ok(())
}

/// Increments stock for every `(product, quantity)` pair, appending one `Add`
/// journal row per pair. The symmetric inverse of [`reserve`], invoked once
/// per cancelled order under the state-machine guard.
pub async fn restore(
    tx: &mut dyn StorageTx,
    store_id: StoreId,
    items: &[(ProductId, u32)],
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<()> {
    for (product_id, quantity) in items {
        let current = tx
            .inventory_for_update(store_id, product_id)
            .await?
            .map(|row| row.quantity)
            .unwrap_or(0);

        tx.upsert_inventory(&StoreInventoryRecord {
            store_id,
            product_id: product_id.clone(),
            quantity: current + quantity,
        })
        .await?;
        tx.append_journal(&StockJournalRecord::new(
            store_id,
            product_id.clone(),
            i64::from(*quantity),
            JournalReason::Add,
            actor,
            now,
        ))
        .await?;

        tracing::debug!(%store_id, %product_id, quantity, "stock restored");
    }
    Ok(())
}

/// Records goods received into a store (restock / initial stocking).
pub async fn receive(
    tx: &mut dyn StorageTx,
    store_id: StoreId,
    product_id: &ProductId,
    quantity: u32,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<()> {
    let current = tx
        .inventory_for_update(store_id, product_id)
        .await?
        .map(|row| row.quantity)
        .unwrap_or(0);

    tx.upsert_inventory(&StoreInventoryRecord {
        store_id,
        product_id: product_id.clone(),
        quantity: current + quantity,
    })
    .await?;
    tx.append_journal(&StockJournalRecord::new(
        store_id,
        product_id.clone(),
        i64::from(quantity),
        JournalReason::Add,
        actor,
        now,
    ))
    .await?;

    tracing::info!(%store_id, %product_id, quantity, "stock received");
    Ok(())
}

/// Moves stock between stores, journalled as `TransferOut` at the source and
/// `TransferIn` at the destination.
pub async fn transfer(
    tx: &mut dyn StorageTx,
    from: StoreId,
    to: StoreId,
    product_id: &ProductId,
    quantity: u32,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<()> {
    let source = tx
        .inventory_for_update(from, product_id)
        .await?
        .ok_or_else(|| ValidationError::NoInventory {
            product_id: product_id.clone(),
        })?;

    if source.quantity < quantity {
        return Err(ValidationError::InsufficientStock {
            product_id: product_id.clone(),
            available: source.quantity,
        }
        .into());
    }

    let dest_quantity = tx
        .inventory_for_update(to, product_id)
        .await?
        .map(|row| row.quantity)
        .unwrap_or(0);

    tx.upsert_inventory(&StoreInventoryRecord {
        quantity: source.quantity - quantity,
        ..source
    })
    .await?;
    tx.upsert_inventory(&StoreInventoryRecord {
        store_id: to,
        product_id: product_id.clone(),
        quantity: dest_quantity + quantity,
    })
    .await?;

    tx.append_journal(&StockJournalRecord::new(
        from,
        product_id.clone(),
        -i64::from(quantity),
        JournalReason::TransferOut,
        actor,
        now,
    ))
    .await?;
    tx.append_journal(&StockJournalRecord::new(
        to,
        product_id.clone(),
        i64::from(quantity),
        JournalReason::TransferIn,
        actor,
        now,
    ))
    .await?;

    tracing::info!(%from, %to, %product_id, quantity, "stock transferred");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LifecycleError;
    use storage::{InMemoryStorage, Storage};

    fn items(pairs: &[(&str, u32)]) -> Vec<(ProductId, u32)> {
        pairs
            .iter()
            .map(|(id, qty)| (ProductId::new(*id), *qty))
            .collect()
    }

    #[tokio::test]
    async fn test_reserve_decrements_and_journals() {
        let storage = InMemoryStorage::new();
        let store_id = StoreId::new();
        storage.set_stock(store_id, ProductId::new("SKU-001"), 5).await;

        let mut tx = storage.begin().await.unwrap();
        reserve(
            tx.as_mut(),
            store_id,
            &items(&[("SKU-001", 5)]),
            Actor::System,
            Utc::now(),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let row = storage
            .inventory(store_id, &ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.quantity, 0);

        let journal = storage
            .journal(store_id, &ProductId::new("SKU-001"))
            .await
            .unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].delta, -5);
        assert_eq!(journal[0].reason, JournalReason::Remove);
    }

    #[tokio::test]
    async fn test_reserve_insufficient_reports_available() {
        let storage = InMemoryStorage::new();
        let store_id = StoreId::new();
        storage.set_stock(store_id, ProductId::new("SKU-001"), 3).await;

        let mut tx = storage.begin().await.unwrap();
        let err = reserve(
            tx.as_mut(),
            store_id,
            &items(&[("SKU-001", 4)]),
            Actor::System,
            Utc::now(),
        )
        .await
        .unwrap_err();

        match err {
            LifecycleError::Validation(ValidationError::InsufficientStock {
                product_id,
                available,
            }) => {
                assert_eq!(product_id.as_str(), "SKU-001");
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_reserve_unknown_row_is_no_inventory() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        let err = reserve(
            tx.as_mut(),
            StoreId::new(),
            &items(&[("SKU-404", 1)]),
            Actor::System,
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::NoInventory { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_multi_item_reserve_leaves_no_partial_decrement() {
        let storage = InMemoryStorage::new();
        let store_id = StoreId::new();
        storage.set_stock(store_id, ProductId::new("SKU-001"), 10).await;
        storage.set_stock(store_id, ProductId::new("SKU-002"), 1).await;

        let mut tx = storage.begin().await.unwrap();
        let result = reserve(
            tx.as_mut(),
            store_id,
            &items(&[("SKU-001", 2), ("SKU-002", 5)]),
            Actor::System,
            Utc::now(),
        )
        .await;
        assert!(result.is_err());
        drop(tx); // abort

        let row = storage
            .inventory(store_id, &ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.quantity, 10);
        assert_eq!(storage.journal_len().await, 0);
    }

    #[tokio::test]
    async fn test_reserve_then_restore_is_net_zero() {
        let storage = InMemoryStorage::new();
        let store_id = StoreId::new();
        storage.set_stock(store_id, ProductId::new("SKU-001"), 8).await;

        let reserved = items(&[("SKU-001", 3)]);

        let mut tx = storage.begin().await.unwrap();
        reserve(tx.as_mut(), store_id, &reserved, Actor::System, Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        restore(tx.as_mut(), store_id, &reserved, Actor::System, Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let row = storage
            .inventory(store_id, &ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.quantity, 8);

        let journal = storage
            .journal(store_id, &ProductId::new("SKU-001"))
            .await
            .unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.iter().map(|e| e.delta).sum::<i64>(), 0);
    }

    #[tokio::test]
    async fn test_receive_creates_row_and_journals() {
        let storage = InMemoryStorage::new();
        let store_id = StoreId::new();
        let product_id = ProductId::new("SKU-001");

        let mut tx = storage.begin().await.unwrap();
        receive(tx.as_mut(), store_id, &product_id, 20, Actor::System, Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let row = storage.inventory(store_id, &product_id).await.unwrap();
        assert_eq!(row.unwrap().quantity, 20);
        assert_eq!(storage.journal_len().await, 1);
    }

    #[tokio::test]
    async fn test_transfer_moves_stock_with_paired_journal() {
        let storage = InMemoryStorage::new();
        let from = StoreId::new();
        let to = StoreId::new();
        let product_id = ProductId::new("SKU-001");
        storage.set_stock(from, product_id.clone(), 10).await;

        let mut tx = storage.begin().await.unwrap();
        transfer(tx.as_mut(), from, to, &product_id, 4, Actor::System, Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let source = storage.inventory(from, &product_id).await.unwrap().unwrap();
        let dest = storage.inventory(to, &product_id).await.unwrap().unwrap();
        assert_eq!(source.quantity, 6);
        assert_eq!(dest.quantity, 4);

        let out = storage.journal(from, &product_id).await.unwrap();
        let inn = storage.journal(to, &product_id).await.unwrap();
        assert_eq!(out[0].reason, JournalReason::TransferOut);
        assert_eq!(inn[0].reason, JournalReason::TransferIn);
    }

    #[tokio::test]
    async fn test_transfer_insufficient_fails() {
        let storage = InMemoryStorage::new();
        let from = StoreId::new();
        let product_id = ProductId::new("SKU-001");
        storage.set_stock(from, product_id.clone(), 2).await;

        let mut tx = storage.begin().await.unwrap();
        let err = transfer(
            tx.as_mut(),
            from,
            StoreId::new(),
            &product_id,
            3,
            Actor::System,
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::InsufficientStock { available: 2, .. })
        ));
    }
}
