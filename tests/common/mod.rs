#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::auth::Claims;
use storefront_api::config::AppConfig;
use storefront_api::db::{self, DbConfig, DbPool};
use storefront_api::entities::{affiliate_account, cart, order, product};
use storefront_api::errors::ServiceError;
use storefront_api::events::{process_events, EventSender};
use storefront_api::gateway::{CreateSessionRequest, GatewaySession, PaymentGateway};
use storefront_api::services::checkout::ProcessedSessions;
use storefront_api::services::AppServices;
use storefront_api::{routes, AppState};

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// In-memory stand-in for the hosted gateway. Sessions open unpaid and are
/// flipped to paid explicitly, mirroring the customer completing payment.
#[derive(Default)]
pub struct MockGateway {
    sessions: Mutex<HashMap<String, GatewaySession>>,
    counter: AtomicU64,
    last: Mutex<Option<String>>,
}

impl MockGateway {
    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .unwrap_or_else(|| panic!("unknown session {session_id}"));
        session.payment_status = "paid".to_string();
        session.payment_intent = Some(format!("pi_{session_id}"));
    }

    pub fn last_session_id(&self) -> String {
        self.last
            .lock()
            .unwrap()
            .clone()
            .expect("no session opened yet")
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("cs_test_{n}");
        let session = GatewaySession {
            id: id.clone(),
            url: Some(format!("https://gateway.test/pay/{id}")),
            payment_status: "unpaid".to_string(),
            payment_intent: None,
            metadata: request.metadata,
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(id.clone(), session.clone());
        *self.last.lock().unwrap() = Some(id);
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, ServiceError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::ExternalServiceError(format!("no such session {session_id}"))
            })
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Arc<DbPool>,
    pub gateway: Arc<MockGateway>,
    pub processed: ProcessedSessions,
    _tmp: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("settlement.sqlite");
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = db::establish_connection_with_config(&DbConfig {
            url: db_url.clone(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
        })
        .await
        .unwrap();
        db::ensure_schema(&pool).await.unwrap();
        let pool = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(process_events(event_rx));
        let event_sender = Arc::new(EventSender::new(event_tx));

        let config = Arc::new(AppConfig::new(
            db_url,
            JWT_SECRET.to_string(),
            "sk_test_123".to_string(),
            "http://stripe.invalid".to_string(),
            "http://localhost:5173".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        ));

        let gateway = Arc::new(MockGateway::default());
        let processed = ProcessedSessions::new();
        let services = AppServices::build(
            pool.clone(),
            gateway.clone(),
            processed.clone(),
            event_sender.clone(),
            &config,
        );
        let state = AppState {
            db: pool.clone(),
            config,
            event_sender,
            services,
        };

        Self {
            router: routes(state),
            db: pool,
            gateway,
            processed,
            _tmp: tmp,
        }
    }

    /// Opens a session through the API, marks it paid at the gateway, and
    /// returns its id.
    pub async fn open_paid_session(
        &self,
        token: Option<&str>,
        amount: &str,
        items: Value,
        affiliate_code: Option<&str>,
    ) -> String {
        let mut body = json!({
            "amount": amount,
            "items": items,
            "address": {"street": "1 Moon St", "city": "Sydney", "email": "a@example.com"},
        });
        if let Some(code) = affiliate_code {
            body["affiliateCode"] = json!(code);
        }

        let (status, resp) = post_json(&self.router, "/checkout/session", token, body).await;
        assert_eq!(status, StatusCode::OK, "session open failed: {resp}");
        assert_eq!(resp["success"], json!(true));

        let session_id = self.gateway.last_session_id();
        self.gateway.mark_paid(&session_id);
        session_id
    }

    pub async fn confirm(&self, token: Option<&str>, session_id: &str) -> (StatusCode, Value) {
        post_json(
            &self.router,
            "/checkout/confirm",
            token,
            json!({"sessionId": session_id}),
        )
        .await
    }
}

pub async fn post_json(
    router: &Router,
    path: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }

    let response = router
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub fn make_token(user_id: Uuid, role: Option<&str>) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.map(|r| r.to_string()),
        iat: now,
        exp: now + 3600,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub async fn seed_product(db: &DbPool, name: &str, price: Decimal, inventory: i32) -> Uuid {
    let id = Uuid::new_v4();
    product::Entity::insert(product::ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        price: Set(price),
        image_url: Set(None),
        inventory: Set(inventory),
    })
    .exec(db)
    .await
    .unwrap();
    id
}

pub async fn seed_affiliate(db: &DbPool, code: &str) -> Uuid {
    let id = Uuid::new_v4();
    affiliate_account::Entity::insert(affiliate_account::ActiveModel {
        id: Set(id),
        affiliate_code: Set(code.to_string()),
        clicks: Set(0),
        sales: Set(0),
        earnings: Set(Decimal::ZERO),
        created_at: Set(Utc::now()),
    })
    .exec(db)
    .await
    .unwrap();
    id
}

pub async fn seed_cart(db: &DbPool, user_id: Uuid, items: Value) {
    cart::Entity::insert(cart::ActiveModel {
        user_id: Set(user_id),
        items: Set(items),
        updated_at: Set(Utc::now()),
    })
    .exec(db)
    .await
    .unwrap();
}

pub async fn product_inventory(db: &DbPool, id: Uuid) -> i32 {
    product::Entity::find_by_id(id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
        .inventory
}

pub async fn affiliate_by_code(db: &DbPool, code: &str) -> affiliate_account::Model {
    affiliate_account::Entity::find()
        .filter(affiliate_account::Column::AffiliateCode.eq(code))
        .one(db)
        .await
        .unwrap()
        .unwrap()
}

pub async fn order_rows(db: &DbPool) -> Vec<order::Model> {
    order::Entity::find().all(db).await.unwrap()
}

pub async fn cart_items(db: &DbPool, user_id: Uuid) -> Value {
    cart::Entity::find_by_id(user_id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
        .items
}

/// Standard single-line cart used by most scenarios: 3 units at 19.99.
pub fn sample_items(product_id: Uuid) -> Value {
    json!([{
        "productId": product_id,
        "name": "Celestial Candle",
        "unitPrice": "19.99",
        "quantity": 3,
        "imageUrl": "https://cdn.example/candle.jpg",
    }])
}
