//! Order creation and fulfillment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::{OrderId, StoreId, UserId};
use domain::{
    Actor, Coordinates, DeliveryDetails, ItemRequest, PaymentMethod, ShippingMethod,
};
use jobs::InMemoryJobQueue;
use lifecycle::{CheckoutRequest, CheckoutService, FixedStoreResolver, FulfillmentService};
use serde::{Deserialize, Serialize};
use storage::{OrderItemRecord, OrderRecord, Storage};

use crate::config::Config;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Storage> {
    pub checkout: CheckoutService<S, InMemoryJobQueue, FixedStoreResolver>,
    pub fulfillment: Arc<FulfillmentService<S, InMemoryJobQueue>>,
    pub queue: Arc<InMemoryJobQueue>,
    pub storage: S,
    pub config: Config,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: Option<String>,
    pub items: Vec<OrderItemRequest>,
    pub store_id: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    pub voucher_code: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize, Default)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub admin: bool,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub store_id: String,
    pub status: String,
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub discount_total: i64,
    pub grand_total: i64,
    pub total_items: u32,
    pub payment_method: String,
    pub payment_deadline_at: String,
    pub created_at: String,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub line_total: i64,
}

fn order_response(order: &OrderRecord, items: &[OrderItemRecord]) -> OrderResponse {
    OrderResponse {
        id: order.id.to_string(),
        user_id: order.user_id.to_string(),
        store_id: order.store_id.to_string(),
        status: order.status.to_string(),
        subtotal: order.subtotal.minor(),
        shipping_cost: order.shipping_cost.minor(),
        discount_total: order.discount_total.minor(),
        grand_total: order.grand_total.minor(),
        total_items: order.total_items,
        payment_method: order.payment_method.as_str().to_string(),
        payment_deadline_at: order.payment_deadline_at.to_rfc3339(),
        created_at: order.created_at.to_rfc3339(),
        items: items
            .iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id.to_string(),
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price.minor(),
                line_total: item.line_total().minor(),
            })
            .collect(),
    }
}

// -- Handlers --

/// POST /orders — submit a checkout.
///
/// The idempotency key is taken from the `Idempotency-Key` header, falling
/// back to the request body.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderResponse>), ApiError> {
    let user_id = match &req.user_id {
        Some(id) => UserId::from_uuid(parse_uuid(id, "user_id")?),
        None => UserId::new(),
    };

    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or(req.idempotency_key);

    let coordinates = match (req.latitude, req.longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };
    let store_id = req
        .store_id
        .as_deref()
        .map(|id| parse_uuid(id, "store_id").map(StoreId::from_uuid))
        .transpose()?;

    let checkout_request = CheckoutRequest {
        user_id,
        items: req
            .items
            .iter()
            .map(|item| ItemRequest::new(item.product_id.as_str(), item.quantity))
            .collect(),
        delivery: DeliveryDetails {
            coordinates,
            address: req.address.clone(),
            store_id,
        },
        payment_method: req.payment_method,
        shipping_method: req.shipping_method,
        voucher_code: req.voucher_code.clone(),
        idempotency_key,
    };

    let receipt = state.checkout.create_order(checkout_request).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(order_response(&receipt.order, &receipt.items)),
    ))
}

/// GET /orders/{id} — load an order with its items.
#[tracing::instrument(skip(state))]
pub async fn get<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .storage
        .order(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    let items = state
        .storage
        .order_items(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(order_response(&order, &items)))
}

/// POST /orders/{id}/confirm-payment — admin confirms a reviewed payment.
#[tracing::instrument(skip(state))]
pub async fn confirm_payment<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.fulfillment.confirm_payment(order_id).await?;
    let items = state
        .storage
        .order_items(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(order_response(&order, &items)))
}

/// POST /orders/{id}/ship — hand the order to the courier.
#[tracing::instrument(skip(state))]
pub async fn ship<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.fulfillment.ship(order_id).await?;
    let items = state
        .storage
        .order_items(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(order_response(&order, &items)))
}

/// POST /orders/{id}/confirm-delivery — customer confirms receipt.
#[tracing::instrument(skip(state))]
pub async fn confirm_delivery<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.fulfillment.confirm_delivery(order_id).await?;
    let items = state
        .storage
        .order_items(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(order_response(&order, &items)))
}

/// POST /orders/{id}/cancel — cancel and roll back an order.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;

    let actor = if req.admin {
        let admin_id = match &req.actor_id {
            Some(id) => UserId::from_uuid(parse_uuid(id, "actor_id")?),
            None => UserId::new(),
        };
        Actor::Admin(admin_id)
    } else {
        let user_id = match &req.actor_id {
            Some(id) => UserId::from_uuid(parse_uuid(id, "actor_id")?),
            None => {
                // Attribute to the order's owner when the caller sent no id.
                state
                    .storage
                    .order(order_id)
                    .await
                    .map_err(|e| ApiError::Internal(e.to_string()))?
                    .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?
                    .user_id
            }
        };
        Actor::User(user_id)
    };

    let order = state
        .fulfillment
        .cancel(order_id, actor, req.reason.as_deref())
        .await?;
    let items = state
        .storage
        .order_items(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(order_response(&order, &items)))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    Ok(OrderId::from_uuid(parse_uuid(id, "order id")?))
}

fn parse_uuid(id: &str, field: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
