//! Payment gateway collaborator interface and the Stripe Checkout
//! implementation.
//!
//! The gateway holds the only durable record of an in-flight checkout: the
//! session metadata written at initiation is echoed back verbatim at
//! confirmation time and decoded exactly once.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Metadata value standing in for "no authenticated user".
pub const GUEST_SENTINEL: &str = "guest";

const METADATA_ADDRESS: &str = "address";
const METADATA_ITEMS: &str = "items";
const METADATA_AMOUNT: &str = "amount";
const METADATA_AFFILIATE_CODE: &str = "affiliateCode";
const METADATA_USER_ID: &str = "userId";

/// A checkout line item as supplied by the client and snapshotted into
/// session metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Decoded view of the metadata attached to a gateway session.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub address: serde_json::Value,
    pub items: Vec<CheckoutItem>,
    pub amount: Decimal,
    /// Empty string at the wire level maps to `None`.
    pub affiliate_code: Option<String>,
    /// `None` when the session was initiated by a guest.
    pub initiating_user_id: Option<Uuid>,
}

impl SessionMetadata {
    /// Encode checkout details into the flat string map the gateway stores.
    pub fn encode(
        address: &serde_json::Value,
        items: &[CheckoutItem],
        amount: Decimal,
        affiliate_code: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<HashMap<String, String>, ServiceError> {
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_ADDRESS.to_string(), address.to_string());
        metadata.insert(
            METADATA_ITEMS.to_string(),
            serde_json::to_string(items).map_err(|e| {
                ServiceError::InternalError(format!("failed to encode session items: {}", e))
            })?,
        );
        metadata.insert(METADATA_AMOUNT.to_string(), amount.to_string());
        metadata.insert(
            METADATA_AFFILIATE_CODE.to_string(),
            affiliate_code.unwrap_or_default().to_string(),
        );
        metadata.insert(
            METADATA_USER_ID.to_string(),
            user_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| GUEST_SENTINEL.to_string()),
        );
        Ok(metadata)
    }

    /// Decode the metadata echoed back by the gateway. A decode failure
    /// indicates a bug at initiation time, not a client error.
    pub fn decode(metadata: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let field = |key: &str| {
            metadata.get(key).ok_or_else(|| {
                ServiceError::InternalError(format!("session metadata missing field '{}'", key))
            })
        };

        let address: serde_json::Value = serde_json::from_str(field(METADATA_ADDRESS)?)
            .map_err(|e| {
                ServiceError::InternalError(format!("malformed session address: {}", e))
            })?;

        let items: Vec<CheckoutItem> = serde_json::from_str(field(METADATA_ITEMS)?)
            .map_err(|e| ServiceError::InternalError(format!("malformed session items: {}", e)))?;

        let amount = Decimal::from_str(field(METADATA_AMOUNT)?)
            .map_err(|e| ServiceError::InternalError(format!("malformed session amount: {}", e)))?;

        let affiliate_code = match field(METADATA_AFFILIATE_CODE)?.as_str() {
            "" => None,
            code => Some(code.to_string()),
        };

        let initiating_user_id = match field(METADATA_USER_ID)?.as_str() {
            GUEST_SENTINEL => None,
            raw => Some(Uuid::parse_str(raw).map_err(|e| {
                ServiceError::InternalError(format!("malformed session user id: {}", e))
            })?),
        };

        Ok(Self {
            address,
            items,
            amount,
            affiliate_code,
            initiating_user_id,
        })
    }
}

/// Request to open a gateway-hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub amount: Decimal,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

/// A gateway checkout session as returned by create/retrieve calls.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub payment_status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl GatewaySession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

/// External payment gateway contract consumed by the settlement core.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a session for the aggregate total and returns it with the
    /// hosted redirect URL populated.
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError>;

    /// Re-queries the gateway for the current state of a session. This is
    /// the sole authentication of a confirmation call.
    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    message: String,
}

/// Stripe Checkout Sessions client.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn amount_in_cents(amount: Decimal) -> Result<i64, ServiceError> {
        (amount * dec!(100))
            .round()
            .to_i64()
            .filter(|cents| *cents > 0)
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("amount {} is not chargeable", amount))
            })
    }

    async fn parse_response(
        &self,
        response: reqwest::Response,
    ) -> Result<GatewaySession, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<GatewaySession>().await.map_err(|e| {
                ServiceError::ExternalServiceError(format!("invalid gateway response: {}", e))
            });
        }

        let message = match response.json::<StripeErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => format!("gateway returned status {}", status),
        };
        error!(status = %status, message = %message, "Gateway request failed");
        Err(ServiceError::ExternalServiceError(message))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(amount = %request.amount))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let cents = Self::amount_in_cents(request.amount)?;

        // Single summary line item for the final total, mirroring how the
        // storefront presents the charge.
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), request.success_url),
            ("cancel_url".into(), request.cancel_url),
            (
                "line_items[0][price_data][currency]".into(),
                request.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                "Order Total".into(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                cents.to_string(),
            ),
            ("line_items[0][quantity]".into(), "1".into()),
        ];
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("gateway unreachable: {}", e))
            })?;

        self.parse_response(response).await
    }

    #[instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, ServiceError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.api_base, session_id
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("gateway unreachable: {}", e))
            })?;

        self.parse_response(response).await
    }
}
