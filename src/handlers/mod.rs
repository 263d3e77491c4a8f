pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{response::IntoResponse, Json};
use serde_json::json;

use crate::db;
use crate::AppState;

/// GET /health — liveness probe, including database connectivity.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (status, database) = match db::check_connection(&state.db).await {
        Ok(()) => (StatusCode::OK, "up"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "down"),
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "database": database,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
