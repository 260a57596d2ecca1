//! Payment gateway notification endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::OrderId;
use serde::{Deserialize, Serialize};
use storage::Storage;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct PaymentNotificationRequest {
    pub order_id: String,
    /// `"paid"` or `"failed"`.
    pub status: String,
    /// Shared-secret signature; cryptographic verification is the gateway
    /// integration's concern, this endpoint only checks the shared secret.
    pub signature: String,
}

#[derive(Serialize)]
pub struct PaymentNotificationResponse {
    pub order_id: String,
    pub order_status: String,
}

/// POST /payments/notifications — receive a signed payment outcome.
///
/// A verified `paid` outcome advances the order to payment review and
/// disarms the auto-cancel timer. A `failed` outcome changes nothing: the
/// timer stays armed and the order cancels at its deadline as usual.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn notify<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<PaymentNotificationRequest>,
) -> Result<Json<PaymentNotificationResponse>, ApiError> {
    if req.signature != state.config.webhook_secret {
        metrics::counter!("payment_webhook_rejected_total").increment(1);
        return Err(ApiError::Unauthorized(
            "invalid payment notification signature".to_string(),
        ));
    }

    let order_id = uuid::Uuid::parse_str(&req.order_id)
        .map(OrderId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order_id: {e}")))?;

    match req.status.as_str() {
        "paid" => {
            let order = state.fulfillment.accept_payment(order_id).await?;
            metrics::counter!("payment_webhook_paid_total").increment(1);
            Ok(Json(PaymentNotificationResponse {
                order_id: order.id.to_string(),
                order_status: order.status.to_string(),
            }))
        }
        "failed" => {
            let order = state
                .storage
                .order(order_id)
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?
                .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;
            metrics::counter!("payment_webhook_failed_total").increment(1);
            tracing::info!(%order_id, "payment failed; auto-cancel timer stays armed");
            Ok(Json(PaymentNotificationResponse {
                order_id: order.id.to_string(),
                order_status: order.status.to_string(),
            }))
        }
        other => Err(ApiError::BadRequest(format!(
            "unknown payment status: {other}"
        ))),
    }
}
