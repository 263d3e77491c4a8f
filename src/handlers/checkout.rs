use axum::{extract::State, response::IntoResponse, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::auth::OptionalIdentity;
use crate::errors::ApiError;
use crate::gateway::CheckoutItem;
use crate::handlers::common::validate_input;
use crate::services::checkout::CheckoutInput;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionPayload {
    pub amount: Decimal,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CheckoutItem>,
    pub address: serde_json::Value,
    #[serde(default)]
    pub affiliate_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPayload {
    #[validate(length(min = 1, message = "sessionId is required"))]
    pub session_id: String,
}

/// POST /checkout/session — opens a gateway checkout session and returns
/// the hosted redirect URL. Guests are welcome; identity only affects
/// eventual order attribution.
pub async fn create_session(
    State(state): State<AppState>,
    OptionalIdentity(identity): OptionalIdentity,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let url = state
        .services
        .checkout
        .create_session(
            identity,
            CheckoutInput {
                amount: payload.amount,
                items: payload.items,
                address: payload.address,
                affiliate_code: payload.affiliate_code,
            },
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "sessionRedirectUrl": url,
    })))
}

/// POST /checkout/confirm — settles a paid session into an order. Replays
/// return the already-settled order with `replayed: true`.
pub async fn confirm_order(
    State(state): State<AppState>,
    OptionalIdentity(identity): OptionalIdentity,
    Json(payload): Json<ConfirmPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let outcome = state
        .services
        .checkout
        .confirm_order(identity, &payload.session_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "order": outcome.order,
        "replayed": outcome.replayed,
        "sideEffects": outcome.side_effects,
    })))
}
