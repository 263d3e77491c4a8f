use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::errors::ApiError;
use crate::AppState;

/// POST /cart/clear — empties the caller's persisted cart. Triggered by the
/// client after it observes a successful confirmation; deliberately not part
/// of the confirmation transaction.
pub async fn clear_cart(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    state.services.carts.clear_cart(user_id).await?;
    Ok(Json(json!({ "success": true, "message": "Cart Cleared" })))
}
