use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "AUD";
const DEFAULT_COMMISSION: f64 = 10.0;
const DEFAULT_PROCESSED_CACHE_CLEAR_SECS: u64 = 3600;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key used to verify caller credentials
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Payment gateway secret key
    pub stripe_secret_key: String,

    /// Payment gateway API base URL (overridable for tests)
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Storefront origin used to build gateway success/cancel redirect URLs
    pub frontend_url: String,

    /// Checkout currency (ISO code)
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Fixed commission credited per qualifying affiliate sale
    #[serde(default = "default_commission")]
    pub affiliate_commission: f64,

    /// Interval between full clears of the processed-session cache (seconds)
    #[serde(default = "default_processed_cache_clear_secs")]
    pub processed_cache_clear_secs: u64,

    /// Whether to bootstrap the database schema on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_commission() -> f64 {
    DEFAULT_COMMISSION
}
fn default_processed_cache_clear_secs() -> u64 {
    DEFAULT_PROCESSED_CACHE_CLEAR_SECS
}
fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    if secret == "your-secret-key" || secret == "secret" {
        let mut err = ValidationError::new("weak_secret");
        err.message = Some("JWT secret must not be a known placeholder".into());
        return Err(err);
    }
    Ok(())
}

impl AppConfig {
    /// Construct a configuration directly; used by tests and tooling.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_url: String,
        jwt_secret: String,
        stripe_secret_key: String,
        stripe_api_base: String,
        frontend_url: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            stripe_secret_key,
            stripe_api_base,
            frontend_url,
            currency: default_currency(),
            affiliate_commission: default_commission(),
            processed_cache_clear_secs: default_processed_cache_clear_secs(),
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Load configuration from config files and `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", environment.clone())?
        .set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?;

    let base_path = Path::new(CONFIG_DIR).join("default");
    builder = builder.add_source(File::from(base_path).required(false));

    let env_path = Path::new(CONFIG_DIR).join(&environment);
    builder = builder.add_source(File::from(env_path).required(false));

    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    let cfg: AppConfig = builder.build()?.try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    if !cfg.is_development() && cfg.jwt_secret == DEV_DEFAULT_JWT_SECRET {
        return Err(ConfigError::Message(
            "the development JWT secret must not be used outside development".to_string(),
        ));
    }

    Ok(cfg)
}

/// Initialize the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "sk_test_123".to_string(),
            DEFAULT_STRIPE_API_BASE.to_string(),
            "http://localhost:5173".to_string(),
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
        )
    }

    #[test]
    fn defaults_match_settlement_policy() {
        let cfg = test_config();
        assert_eq!(cfg.currency, "AUD");
        assert_eq!(cfg.affiliate_commission, 10.0);
        assert_eq!(cfg.processed_cache_clear_secs, 3600);
        assert!(cfg.is_development());
    }

    #[test]
    fn placeholder_jwt_secret_is_rejected() {
        let mut cfg = test_config();
        cfg.jwt_secret = "your-secret-key".to_string();
        assert!(cfg.validate().is_err());
    }
}
