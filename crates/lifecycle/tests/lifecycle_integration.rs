//! End-to-end tests of the order lifecycle engine over in-memory backends.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use common::{ProductId, StoreId, UserId, VoucherId};
use domain::{
    Actor, DeliveryDetails, ItemRequest, Money, OrderStatus, PaymentMethod, ShippingMethod,
};
use jobs::{InMemoryJobQueue, JobId, JobKind, TransitionScheduler, WorkerPool};
use lifecycle::{
    CheckoutConfig, CheckoutRequest, CheckoutService, FixedStoreResolver, FulfillmentConfig,
    FulfillmentService, IdempotencyRegistry, LifecycleError, TransitionJobHandler,
    TransitionOutcome, ValidationError,
};
use storage::{InMemoryStorage, JournalReason, ProductRecord, Storage, VoucherRecord};
use tokio::time::Duration;

struct Harness {
    storage: InMemoryStorage,
    queue: Arc<InMemoryJobQueue>,
    checkout: Arc<CheckoutService<InMemoryStorage, InMemoryJobQueue, FixedStoreResolver>>,
    fulfillment: Arc<FulfillmentService<InMemoryStorage, InMemoryJobQueue>>,
    store_id: StoreId,
    user_id: UserId,
}

async fn setup() -> Harness {
    setup_with(FulfillmentConfig::default()).await
}

async fn setup_with(fulfillment_config: FulfillmentConfig) -> Harness {
    let storage = InMemoryStorage::new();
    let queue = Arc::new(InMemoryJobQueue::new());
    let scheduler = TransitionScheduler::new(queue.clone());
    let store_id = StoreId::new();

    storage
        .seed_product(ProductRecord {
            id: ProductId::new("SKU-001"),
            name: "Bananas 1kg".to_string(),
            price: Money::from_minor(1_000),
            active: true,
        })
        .await;
    storage
        .seed_product(ProductRecord {
            id: ProductId::new("SKU-002"),
            name: "Oat milk 1l".to_string(),
            price: Money::from_minor(2_500),
            active: true,
        })
        .await;

    let checkout = Arc::new(CheckoutService::new(
        storage.clone(),
        scheduler.clone(),
        FixedStoreResolver::serving(store_id),
        IdempotencyRegistry::new(Duration::from_secs(600)),
        CheckoutConfig::default(),
    ));
    let fulfillment = Arc::new(FulfillmentService::new(
        storage.clone(),
        scheduler,
        fulfillment_config,
    ));

    Harness {
        storage,
        queue,
        checkout,
        fulfillment,
        store_id,
        user_id: UserId::new(),
    }
}

fn request(h: &Harness, items: Vec<ItemRequest>) -> CheckoutRequest {
    CheckoutRequest {
        user_id: h.user_id,
        items,
        delivery: DeliveryDetails {
            store_id: Some(h.store_id),
            ..DeliveryDetails::default()
        },
        payment_method: PaymentMethod::BankTransfer,
        shipping_method: ShippingMethod::Pickup,
        voucher_code: None,
        idempotency_key: None,
    }
}

async fn stock(h: &Harness, sku: &str) -> u32 {
    h.storage
        .inventory(h.store_id, &ProductId::new(sku))
        .await
        .unwrap()
        .map(|row| row.quantity)
        .unwrap_or(0)
}

#[tokio::test]
async fn test_checkout_creates_pending_order_with_deadline() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 10)
        .await;

    let receipt = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 2)]))
        .await
        .unwrap();

    let order = &receipt.order;
    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert_eq!(order.subtotal.minor(), 2_000);
    assert_eq!(order.grand_total.minor(), 2_000);
    assert_eq!(order.total_items, 2);
    assert!(order.totals_consistent());
    assert_eq!(
        order.payment_deadline_at,
        order.created_at + ChronoDuration::minutes(60)
    );

    // Price snapshot is captured on the item.
    assert_eq!(receipt.items.len(), 1);
    assert_eq!(receipt.items[0].unit_price.minor(), 1_000);

    // Auto-cancel timer is armed after commit.
    assert!(
        h.queue
            .has_pending(&JobId::for_order(JobKind::AutoCancel, order.id))
    );

    // Persisted state matches the receipt.
    let persisted = h.storage.order(order.id).await.unwrap().unwrap();
    assert_eq!(&persisted, order);
    assert_eq!(stock(&h, "SKU-001").await, 8);
}

#[tokio::test]
async fn test_scenario_last_units_and_insufficient_stock() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 5)
        .await;

    h.checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 5)]))
        .await
        .unwrap();

    assert_eq!(stock(&h, "SKU-001").await, 0);
    let journal = h
        .storage
        .journal(h.store_id, &ProductId::new("SKU-001"))
        .await
        .unwrap();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].delta, -5);
    assert_eq!(journal[0].reason, JournalReason::Remove);

    let err = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 1)]))
        .await
        .unwrap_err();
    match err {
        LifecycleError::Validation(ValidationError::InsufficientStock {
            product_id,
            available,
        }) => {
            assert_eq!(product_id.as_str(), "SKU-001");
            assert_eq!(available, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_oversell_under_concurrent_checkouts() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 5)
        .await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let checkout = h.checkout.clone();
        let req = request(&h, vec![ItemRequest::new("SKU-001", 1)]);
        handles.push(tokio::spawn(async move { checkout.create_order(req).await }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(stock(&h, "SKU-001").await, 0);
}

#[tokio::test]
async fn test_idempotent_creation_replays_same_order() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 10)
        .await;

    let mut req = request(&h, vec![ItemRequest::new("SKU-001", 2)]);
    req.idempotency_key = Some("checkout-abc".to_string());

    let first = h.checkout.create_order(req.clone()).await.unwrap();
    let second = h.checkout.create_order(req).await.unwrap();

    assert_eq!(first.order.id, second.order.id);
    assert_eq!(first.order, second.order);
    assert_eq!(first.items, second.items);

    // The reservation ran exactly once.
    assert_eq!(stock(&h, "SKU-001").await, 8);
    assert_eq!(h.storage.journal_len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_idempotent_creation_under_concurrency() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 10)
        .await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let checkout = h.checkout.clone();
        let mut req = request(&h, vec![ItemRequest::new("SKU-001", 1)]);
        req.idempotency_key = Some("same-key".to_string());
        handles.push(tokio::spawn(async move { checkout.create_order(req).await }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().order.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(stock(&h, "SKU-001").await, 9);
}

#[tokio::test]
async fn test_failed_attempt_evicts_key_for_retry() {
    let h = setup().await;
    // No stock seeded: the first attempt fails.

    let mut req = request(&h, vec![ItemRequest::new("SKU-001", 1)]);
    req.idempotency_key = Some("retry-key".to_string());

    let err = h.checkout.create_order(req.clone()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    // Stock arrives; the same key must start a fresh attempt.
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 1)
        .await;
    let receipt = h.checkout.create_order(req).await.unwrap();
    assert_eq!(receipt.order.status, OrderStatus::PendingPayment);
}

#[tokio::test]
async fn test_conservation_on_rollback() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 7)
        .await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-002"), 9)
        .await;

    let receipt = h
        .checkout
        .create_order(request(
            &h,
            vec![ItemRequest::new("SKU-001", 2), ItemRequest::new("SKU-002", 3)],
        ))
        .await
        .unwrap();
    assert_eq!(stock(&h, "SKU-001").await, 5);
    assert_eq!(stock(&h, "SKU-002").await, 6);

    let cancelled = h
        .fulfillment
        .cancel(receipt.order.id, Actor::User(h.user_id), Some("changed my mind"))
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Reserve then restore is a no-op on net stock.
    assert_eq!(stock(&h, "SKU-001").await, 7);
    assert_eq!(stock(&h, "SKU-002").await, 9);

    let journal = h
        .storage
        .journal(h.store_id, &ProductId::new("SKU-001"))
        .await
        .unwrap();
    assert_eq!(journal.iter().map(|e| e.delta).sum::<i64>(), 0);
}

#[tokio::test]
async fn test_guarded_auto_cancel_is_noop_past_pending() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 4)
        .await;

    let receipt = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 1)]))
        .await
        .unwrap();
    let order_id = receipt.order.id;

    h.fulfillment.accept_payment(order_id).await.unwrap();
    h.fulfillment.confirm_payment(order_id).await.unwrap();

    let journal_before = h.storage.journal_len().await;
    let outcome = h.fulfillment.auto_cancel(order_id).await.unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Skipped {
            current: OrderStatus::Processing
        }
    );

    // Status, stock, and journal all untouched.
    let order = h.storage.order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(stock(&h, "SKU-001").await, 3);
    assert_eq!(h.storage.journal_len().await, journal_before);
}

#[tokio::test]
async fn test_accept_payment_disarms_auto_cancel() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 4)
        .await;

    let receipt = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 1)]))
        .await
        .unwrap();
    let order_id = receipt.order.id;
    assert!(h.queue.has_pending(&JobId::for_order(JobKind::AutoCancel, order_id)));

    let order = h.fulfillment.accept_payment(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::PaymentReview);
    assert!(!h.queue.has_pending(&JobId::for_order(JobKind::AutoCancel, order_id)));
}

#[tokio::test(start_paused = true)]
async fn test_auto_cancel_fires_at_deadline_and_restores_stock() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 6)
        .await;

    let handler = Arc::new(TransitionJobHandler::new(h.fulfillment.clone()));
    let pool = WorkerPool::new(h.queue.clone(), handler, 1).spawn();

    let receipt = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 2)]))
        .await
        .unwrap();
    let order_id = receipt.order.id;
    assert_eq!(stock(&h, "SKU-001").await, 4);

    // Jump past the payment deadline; the worker picks the due job.
    tokio::time::advance(Duration::from_secs(3601)).await;
    for _ in 0..2000 {
        let order = h.storage.order(order_id).await.unwrap().unwrap();
        if order.status == OrderStatus::Cancelled {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    pool.shutdown().await;

    let order = h.storage.order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(stock(&h, "SKU-001").await, 6);
}

#[tokio::test]
async fn test_auto_confirm_premature_firing_is_transient() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 2)
        .await;

    let receipt = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 1)]))
        .await
        .unwrap();
    let order_id = receipt.order.id;

    h.fulfillment.accept_payment(order_id).await.unwrap();
    h.fulfillment.confirm_payment(order_id).await.unwrap();
    h.fulfillment.ship(order_id).await.unwrap();
    assert!(h.queue.has_pending(&JobId::for_order(JobKind::AutoConfirm, order_id)));

    // Dwell (7 days) has not elapsed; the firing must fail so the queue
    // retries later, rather than confirming early.
    let err = h.fulfillment.auto_confirm(order_id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::PrematureAutoConfirm));

    let order = h.storage.order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);
}

#[tokio::test]
async fn test_auto_confirm_applies_after_dwell() {
    let h = setup_with(FulfillmentConfig {
        confirm_dwell: ChronoDuration::zero(),
        ..FulfillmentConfig::default()
    })
    .await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 2)
        .await;

    let receipt = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 1)]))
        .await
        .unwrap();
    let order_id = receipt.order.id;

    h.fulfillment.accept_payment(order_id).await.unwrap();
    h.fulfillment.confirm_payment(order_id).await.unwrap();
    h.fulfillment.ship(order_id).await.unwrap();

    let outcome = h.fulfillment.auto_confirm(order_id).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Applied);

    let order = h.storage.order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_manual_delivery_confirmation_disarms_auto_confirm() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 2)
        .await;

    let receipt = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 1)]))
        .await
        .unwrap();
    let order_id = receipt.order.id;

    h.fulfillment.accept_payment(order_id).await.unwrap();
    h.fulfillment.confirm_payment(order_id).await.unwrap();
    h.fulfillment.ship(order_id).await.unwrap();

    let order = h.fulfillment.confirm_delivery(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert!(!h.queue.has_pending(&JobId::for_order(JobKind::AutoConfirm, order_id)));

    // A straggler delivery of the job is a no-op.
    let outcome = h.fulfillment.auto_confirm(order_id).await.unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Skipped {
            current: OrderStatus::Confirmed
        }
    );
}

#[tokio::test]
async fn test_voucher_consumed_at_checkout_and_reactivated_on_cancel() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-002"), 5)
        .await;
    h.storage
        .seed_voucher(VoucherRecord {
            id: VoucherId::new(),
            code: "FRESH5".to_string(),
            user_id: h.user_id,
            amount: Money::from_minor(500),
            used: false,
            used_at: None,
        })
        .await;

    let mut req = request(&h, vec![ItemRequest::new("SKU-002", 2)]);
    req.voucher_code = Some("FRESH5".to_string());
    let receipt = h.checkout.create_order(req).await.unwrap();

    assert_eq!(receipt.order.discount_total.minor(), 500);
    assert_eq!(receipt.order.grand_total.minor(), 4_500);
    let voucher = h.storage.voucher_by_code("FRESH5").await.unwrap().unwrap();
    assert!(voucher.used);

    // Reusing the consumed voucher is rejected.
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 5)
        .await;
    let mut reuse = request(&h, vec![ItemRequest::new("SKU-001", 1)]);
    reuse.voucher_code = Some("FRESH5".to_string());
    let err = h.checkout.create_order(reuse).await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Validation(ValidationError::VoucherAlreadyUsed { .. })
    ));

    // Cancellation reactivates it.
    h.fulfillment
        .cancel(receipt.order.id, Actor::User(h.user_id), None)
        .await
        .unwrap();
    let voucher = h.storage.voucher_by_code("FRESH5").await.unwrap().unwrap();
    assert!(!voucher.used);
    assert!(voucher.used_at.is_none());
}

#[tokio::test]
async fn test_store_unresolved_is_terminal_validation_error() {
    let h = setup().await;
    let checkout = CheckoutService::new(
        h.storage.clone(),
        TransitionScheduler::new(h.queue.clone()),
        FixedStoreResolver::out_of_radius(),
        IdempotencyRegistry::new(Duration::from_secs(600)),
        CheckoutConfig::default(),
    );

    let mut req = request(&h, vec![ItemRequest::new("SKU-001", 1)]);
    req.delivery = DeliveryDetails::default();
    let err = checkout.create_order(req).await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Validation(ValidationError::StoreUnresolved)
    ));
}

#[tokio::test]
async fn test_unknown_and_inactive_products_rejected_by_name() {
    let h = setup().await;
    h.storage
        .seed_product(ProductRecord {
            id: ProductId::new("SKU-OFF"),
            name: "Delisted".to_string(),
            price: Money::from_minor(100),
            active: false,
        })
        .await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-OFF"), 5)
        .await;

    let err = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-404", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Validation(ValidationError::UnknownProduct { ref product_id })
            if product_id.as_str() == "SKU-404"
    ));

    let err = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-OFF", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Validation(ValidationError::InactiveProduct { ref product_id })
            if product_id.as_str() == "SKU-OFF"
    ));
}

#[tokio::test]
async fn test_user_cannot_cancel_after_payment_but_admin_can() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 4)
        .await;

    let receipt = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 2)]))
        .await
        .unwrap();
    let order_id = receipt.order.id;

    h.fulfillment.accept_payment(order_id).await.unwrap();

    let err = h
        .fulfillment
        .cancel(order_id, Actor::User(h.user_id), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));

    let order = h
        .fulfillment
        .cancel(order_id, Actor::Admin(UserId::new()), Some("fraud check"))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(stock(&h, "SKU-001").await, 4);
}

#[tokio::test]
async fn test_transition_conflicts_surface_current_status() {
    let h = setup().await;
    h.storage
        .set_stock(h.store_id, ProductId::new("SKU-001"), 2)
        .await;

    let receipt = h
        .checkout
        .create_order(request(&h, vec![ItemRequest::new("SKU-001", 1)]))
        .await
        .unwrap();
    let order_id = receipt.order.id;

    // Shipping an unpaid order conflicts.
    let err = h.fulfillment.ship(order_id).await.unwrap_err();
    match err {
        LifecycleError::Conflict { current, .. } => {
            assert_eq!(current, OrderStatus::PendingPayment);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Accepting payment twice conflicts the second time.
    h.fulfillment.accept_payment(order_id).await.unwrap();
    let err = h.fulfillment.accept_payment(order_id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));
}
