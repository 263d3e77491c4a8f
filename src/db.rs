use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
};
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool with custom pool tuning.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(opt).await?;

    info!(
        max_connections = config.max_connections,
        "Database connection pool established"
    );

    Ok(pool)
}

/// Establish a DB pool using AppConfig tuning.
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Checks that the database connection is alive.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    pool.ping().await?;
    Ok(())
}

/// Creates the settlement tables and indexes if they do not exist.
///
/// The unique index on `orders.gateway_session_id` is load-bearing: it is the
/// storage-level guarantee that at most one order exists per gateway session,
/// and the checkout service relies on the resulting insert rejection to
/// recover concurrent duplicate confirmations.
pub async fn ensure_schema(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Ensuring settlement schema");

    let backend = pool.get_database_backend();
    let (uuid_ty, money_ty, json_ty, ts_ty) = match backend {
        DbBackend::Postgres => ("UUID", "NUMERIC(19, 4)", "JSONB", "TIMESTAMPTZ"),
        _ => ("TEXT", "REAL", "TEXT", "TEXT"),
    };

    let statements = [
        format!(
            r#"CREATE TABLE IF NOT EXISTS orders (
                id {uuid} PRIMARY KEY NOT NULL,
                owner_id {uuid},
                address {json} NOT NULL,
                amount {money} NOT NULL,
                status VARCHAR(32) NOT NULL,
                payment_method VARCHAR(32) NOT NULL,
                paid BOOLEAN NOT NULL,
                gateway_session_id VARCHAR(255) NOT NULL,
                gateway_charge_ref VARCHAR(255),
                tracking_url TEXT,
                invoice_url TEXT,
                created_at {ts} NOT NULL
            );"#,
            uuid = uuid_ty,
            json = json_ty,
            money = money_ty,
            ts = ts_ty,
        ),
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_gateway_session_id \
         ON orders (gateway_session_id);"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_orders_owner_id ON orders (owner_id);".to_string(),
        format!(
            r#"CREATE TABLE IF NOT EXISTS order_items (
                id {uuid} PRIMARY KEY NOT NULL,
                order_id {uuid} NOT NULL,
                product_id {uuid} NOT NULL,
                name TEXT NOT NULL,
                unit_price {money} NOT NULL,
                quantity INTEGER NOT NULL,
                image_url TEXT,
                position INTEGER NOT NULL
            );"#,
            uuid = uuid_ty,
            money = money_ty,
        ),
        "CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items (order_id);"
            .to_string(),
        format!(
            r#"CREATE TABLE IF NOT EXISTS products (
                id {uuid} PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                price {money} NOT NULL,
                image_url TEXT,
                inventory INTEGER NOT NULL DEFAULT 0
            );"#,
            uuid = uuid_ty,
            money = money_ty,
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS affiliate_accounts (
                id {uuid} PRIMARY KEY NOT NULL,
                affiliate_code VARCHAR(64) NOT NULL UNIQUE,
                clicks INTEGER NOT NULL DEFAULT 0,
                sales INTEGER NOT NULL DEFAULT 0,
                earnings {money} NOT NULL DEFAULT 0,
                created_at {ts} NOT NULL
            );"#,
            uuid = uuid_ty,
            money = money_ty,
            ts = ts_ty,
        ),
        format!(
            r#"CREATE TABLE IF NOT EXISTS carts (
                user_id {uuid} PRIMARY KEY NOT NULL,
                items {json} NOT NULL,
                updated_at {ts} NOT NULL
            );"#,
            uuid = uuid_ty,
            json = json_ty,
            ts = ts_ty,
        ),
    ];

    for sql in statements {
        pool.execute(Statement::from_string(backend, sql)).await?;
    }

    info!("Settlement schema ready");
    Ok(())
}
