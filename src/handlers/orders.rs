use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AdminUser, AuthenticatedUser};
use crate::errors::ApiError;
use crate::handlers::common::validate_input;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusPayload {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrackingPayload {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "trackingUrl is required"))]
    pub tracking_url: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoicePayload {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "invoiceUrl is required"))]
    pub invoice_url: String,
}

/// POST /orders/list — every order, newest first. Admin only.
pub async fn list_all(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state.services.orders.list_all().await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

/// POST /orders/user — the caller's own orders, newest first.
pub async fn user_orders(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state.services.orders.list_for_user(user_id).await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

/// POST /orders/status — sets the fulfilment status. Admin only.
pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<UpdateStatusPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    state
        .services
        .orders
        .update_status(payload.order_id, &payload.status)
        .await?;
    Ok(Json(json!({ "success": true, "message": "Status Updated" })))
}

/// POST /orders/tracking — replaces the tracking URL. Admin only.
pub async fn update_tracking(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<UpdateTrackingPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    state
        .services
        .orders
        .update_tracking_url(payload.order_id, payload.tracking_url)
        .await?;
    Ok(Json(json!({ "success": true, "message": "Tracking Updated" })))
}

/// POST /orders/invoice — replaces the invoice URL. Admin only.
pub async fn update_invoice(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<UpdateInvoicePayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    state
        .services
        .orders
        .update_invoice_url(payload.order_id, payload.invoice_url)
        .await?;
    Ok(Json(json!({ "success": true, "message": "Invoice Updated" })))
}
