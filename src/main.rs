use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use tokio::sync::mpsc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use storefront_api::config::{init_tracing, load_config, AppConfig};
use storefront_api::db;
use storefront_api::events::{process_events, EventSender};
use storefront_api::gateway::StripeGateway;
use storefront_api::services::checkout::ProcessedSessions;
use storefront_api::services::AppServices;
use storefront_api::{routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);

    info!(
        environment = %config.environment,
        "Starting storefront settlement service"
    );

    let pool = db::establish_connection_from_app_config(&config)
        .await
        .context("failed to connect to database")?;
    db::check_connection(&pool)
        .await
        .context("database did not answer ping")?;
    if config.auto_migrate {
        db::ensure_schema(&pool)
            .await
            .context("failed to bootstrap schema")?;
    }
    let pool = Arc::new(pool);

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(process_events(event_rx));

    let gateway = Arc::new(StripeGateway::new(
        config.stripe_secret_key.clone(),
        config.stripe_api_base.clone(),
    ));

    let processed = ProcessedSessions::new();
    let _sweeper = processed.spawn_sweeper(Duration::from_secs(config.processed_cache_clear_secs));

    let config = Arc::new(config);
    let services = AppServices::build(
        pool.clone(),
        gateway,
        processed,
        event_sender.clone(),
        &config,
    );

    let state = AppState {
        db: pool,
        config: config.clone(),
        event_sender,
        services,
    };

    let app = routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid host/port")?;
    info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Explicit origin allow-list when configured; permissive otherwise (only
/// sensible in development, and logged as such).
fn cors_layer(config: &AppConfig) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(raw) => {
            let origins: Vec<HeaderValue> = raw
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => {
            if !config.is_development() {
                warn!("No CORS allow-list configured; falling back to permissive CORS");
            }
            CorsLayer::permissive()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => warn!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c; shutting down"),
        _ = terminate => info!("Received SIGTERM; shutting down"),
    }
}
