//! HTTP API server with observability for the marketplace order engine.
//!
//! Provides REST endpoints for checkout, payment notifications, and
//! fulfillment actions, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::StoreId;
use jobs::{InMemoryJobQueue, TransitionScheduler, WorkerPool};
use lifecycle::{
    CheckoutConfig, CheckoutService, FixedStoreResolver, FulfillmentConfig, FulfillmentService,
    IdempotencyRegistry, TransitionJobHandler,
};
use metrics_exporter_prometheus::PrometheusHandle;
use storage::Storage;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Storage + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/confirm-payment",
            post(routes::orders::confirm_payment::<S>),
        )
        .route("/orders/{id}/ship", post(routes::orders::ship::<S>))
        .route(
            "/orders/{id}/confirm-delivery",
            post(routes::orders::confirm_delivery::<S>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/payments/notifications",
            post(routes::payments::notify::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state over the given storage backend,
/// with in-memory stand-ins for the queue and store-resolution collaborators.
///
/// Returns the state plus the unspawned worker pool so the caller decides
/// when consumers start.
pub fn create_default_state<S: Storage + Clone + 'static>(
    storage: S,
    config: Config,
) -> (
    Arc<AppState<S>>,
    WorkerPool<InMemoryJobQueue, TransitionJobHandler<S, InMemoryJobQueue>>,
) {
    let queue = Arc::new(InMemoryJobQueue::new());
    let scheduler = TransitionScheduler::new(queue.clone());

    let checkout = CheckoutService::new(
        storage.clone(),
        scheduler.clone(),
        FixedStoreResolver::serving(StoreId::new()),
        IdempotencyRegistry::new(tokio::time::Duration::from_secs(24 * 60 * 60)),
        CheckoutConfig::default(),
    );
    let fulfillment = Arc::new(FulfillmentService::new(
        storage.clone(),
        scheduler,
        FulfillmentConfig::default(),
    ));

    let handler = Arc::new(TransitionJobHandler::new(fulfillment.clone()));
    let job_workers = config.job_workers;
    let state = Arc::new(AppState {
        checkout,
        fulfillment,
        queue: queue.clone(),
        storage,
        config,
    });

    let pool = WorkerPool::new(queue, handler, job_workers);
    (state, pool)
}
