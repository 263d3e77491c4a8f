//! Checkout settlement core for the storefront: gateway session initiation,
//! idempotent payment confirmation, order materialization, best-effort
//! inventory and commission reconciliation, and the admin order surface.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod services;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::AppServices;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub services: AppServices,
}

/// The full HTTP surface.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/checkout/session", post(handlers::checkout::create_session))
        .route("/checkout/confirm", post(handlers::checkout::confirm_order))
        .route("/orders/list", post(handlers::orders::list_all))
        .route("/orders/user", post(handlers::orders::user_orders))
        .route("/orders/status", post(handlers::orders::update_status))
        .route("/orders/tracking", post(handlers::orders::update_tracking))
        .route("/orders/invoice", post(handlers::orders::update_invoice))
        .route("/cart/clear", post(handlers::carts::clear_cart))
        .with_state(state)
}
