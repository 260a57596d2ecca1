//! Rollback of a cancelled order's committed side effects.

use chrono::{DateTime, Duration, Utc};
use common::ProductId;
use domain::Actor;
use storage::{OrderItemRecord, OrderRecord, StorageTx};

use crate::error::Result;
use crate::ledger;

/// Reverses the effects of order creation inside the caller's transaction:
/// restores every reserved quantity and reactivates vouchers the owner used
/// around the order's creation time.
///
/// Inventory restoration is the load-bearing step; any failure there aborts
/// the transaction and the status change with it. Voucher reactivation is a
/// heuristic correlation (a time window, not a foreign key) and best-effort:
/// its failures are logged without aborting.
pub async fn rollback(
    tx: &mut dyn StorageTx,
    order: &OrderRecord,
    items: &[OrderItemRecord],
    actor: Actor,
    voucher_window: Duration,
    now: DateTime<Utc>,
) -> Result<()> {
    let restored: Vec<(ProductId, u32)> = items
        .iter()
        .map(|item| (item.product_id.clone(), item.quantity))
        .collect();
    ledger::restore(tx, order.store_id, &restored, actor, now).await?;

    reactivate_vouchers(tx, order, voucher_window).await;

    metrics::counter!("orders_rolled_back_total").increment(1);
    tracing::info!(
        order_id = %order.id,
        items = items.len(),
        %actor,
        "order side effects rolled back"
    );
    Ok(())
}

async fn reactivate_vouchers(tx: &mut dyn StorageTx, order: &OrderRecord, window: Duration) {
    let from = order.created_at - window;
    let to = order.created_at + window;

    let used = match tx.vouchers_used_between(order.user_id, from, to).await {
        Ok(vouchers) => vouchers,
        Err(err) => {
            tracing::warn!(order_id = %order.id, %err, "voucher lookup failed during rollback");
            return;
        }
    };

    for mut voucher in used {
        voucher.used = false;
        voucher.used_at = None;
        match tx.update_voucher(&voucher).await {
            Ok(()) => {
                tracing::info!(
                    order_id = %order.id,
                    voucher = %voucher.code,
                    "voucher reactivated"
                );
            }
            Err(err) => {
                tracing::warn!(
                    order_id = %order.id,
                    voucher = %voucher.code,
                    %err,
                    "voucher reactivation failed"
                );
            }
        }
    }
}
