//! Checkout session initiation and idempotent payment confirmation.
//!
//! Confirmation is guarded twice: a cheap in-memory processed-set for rapid
//! duplicate calls, and the unique index on `orders.gateway_session_id` for
//! everything the cache cannot see (cache clears, process restarts, and the
//! race where two confirmations for one session interleave between the
//! existence check and the insert).

use chrono::Utc;
use dashmap::DashSet;
use rust_decimal::Decimal;
use sea_orm::{EntityTrait, Set, SqlErr, TransactionTrait};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::OrderStatus;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    CheckoutItem, CreateSessionRequest, PaymentGateway, SessionMetadata,
};
use crate::services::affiliates::{AffiliateService, CommissionOutcome};
use crate::services::inventory::{InventoryOutcome, InventoryService};
use crate::services::orders::{OrderRecord, OrderService};

/// Label recorded on every order settled through the hosted gateway flow.
const PAYMENT_METHOD: &str = "Stripe";

/// Session identifiers already settled by this process. Add-only between
/// timer-driven full clears; the database unique index remains authoritative.
#[derive(Clone, Default)]
pub struct ProcessedSessions {
    inner: Arc<DashSet<String>>,
}

impl ProcessedSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.contains(session_id)
    }

    pub fn insert(&self, session_id: &str) {
        self.inner.insert(session_id.to_string());
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Clears the whole set on a fixed interval, bounding its memory use.
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let set = self.inner.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let entries = set.len();
                set.clear();
                debug!(entries, "Processed-session cache cleared");
            }
        })
    }
}

/// Checkout details as accepted from the client, already validated at the
/// HTTP boundary.
#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub amount: Decimal,
    pub items: Vec<CheckoutItem>,
    pub address: serde_json::Value,
    pub affiliate_code: Option<String>,
}

/// Recorded results of the post-commit side effects of one confirmation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub inventory: Vec<InventoryOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<CommissionOutcome>,
}

/// Result of a confirmation call. `replayed` marks calls that matched an
/// already-settled session; their report is empty because side effects run
/// at most once.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOutcome {
    pub order: OrderRecord,
    pub replayed: bool,
    pub side_effects: SettlementReport,
}

/// Owner preference: the identity on the confirmation request wins over the
/// one recorded at initiation, so a user who logged in mid-checkout still
/// gets an attributed order.
fn resolve_owner(request_identity: Option<Uuid>, session_identity: Option<Uuid>) -> Option<Uuid> {
    request_identity.or(session_identity)
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    inventory: InventoryService,
    affiliates: AffiliateService,
    orders: OrderService,
    processed: ProcessedSessions,
    event_sender: Arc<EventSender>,
    currency: String,
    frontend_url: String,
    commission: Decimal,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        inventory: InventoryService,
        affiliates: AffiliateService,
        orders: OrderService,
        processed: ProcessedSessions,
        event_sender: Arc<EventSender>,
        currency: String,
        frontend_url: String,
        commission: Decimal,
    ) -> Self {
        Self {
            db,
            gateway,
            inventory,
            affiliates,
            orders,
            processed,
            event_sender,
            currency: currency.to_uppercase(),
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            commission,
        }
    }

    /// Opens a gateway session for the supplied total and returns the hosted
    /// redirect URL. Creates no local record; the session metadata is the
    /// only trace of the in-flight checkout.
    #[instrument(skip(self, input), fields(amount = %input.amount, lines = input.items.len()))]
    pub async fn create_session(
        &self,
        identity: Option<Uuid>,
        input: CheckoutInput,
    ) -> Result<String, ServiceError> {
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "amount must be greater than zero".to_string(),
            ));
        }
        if input.items.is_empty() {
            return Err(ServiceError::InvalidInput(
                "at least one item is required".to_string(),
            ));
        }
        for item in &input.items {
            if item.quantity <= 0 {
                return Err(ServiceError::InvalidInput(format!(
                    "item '{}' has non-positive quantity",
                    item.name
                )));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(ServiceError::InvalidInput(format!(
                    "item '{}' has a negative unit price",
                    item.name
                )));
            }
        }

        let metadata = SessionMetadata::encode(
            &input.address,
            &input.items,
            input.amount,
            input.affiliate_code.as_deref().filter(|c| !c.is_empty()),
            identity,
        )?;

        let session = self
            .gateway
            .create_session(CreateSessionRequest {
                amount: input.amount,
                currency: self.currency.clone(),
                success_url: format!(
                    "{}/order-placed?success=true&session_id={{CHECKOUT_SESSION_ID}}",
                    self.frontend_url
                ),
                cancel_url: format!("{}/place-order?cancel=true", self.frontend_url),
                metadata,
            })
            .await?;

        let _ = self
            .event_sender
            .send(Event::CheckoutSessionOpened {
                gateway_session_id: session.id.clone(),
                amount: input.amount,
            })
            .await;

        session.url.ok_or_else(|| {
            ServiceError::ExternalServiceError("gateway returned no redirect URL".to_string())
        })
    }

    /// Settles a paid session into exactly one durable order.
    ///
    /// Guard order: in-memory processed-set, then gateway payment status,
    /// then the durable existing-order check. The unique index backstops the
    /// window between that check and the insert.
    #[instrument(skip(self))]
    pub async fn confirm_order(
        &self,
        identity: Option<Uuid>,
        session_id: &str,
    ) -> Result<ConfirmOutcome, ServiceError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(ServiceError::InvalidInput("sessionId is required".to_string()));
        }

        // Cheap duplicate check. On a hit the settled order is served
        // without touching the gateway. A hit without a matching row means
        // the cache is stale; fall through to the full path.
        if self.processed.contains(session_id) {
            if let Some(existing) = self.orders.find_by_session_id(session_id).await? {
                debug!(session_id, "Confirmation replayed from processed cache");
                return Ok(self.replay(existing, session_id).await);
            }
        }

        let session = self.gateway.retrieve_session(session_id).await?;
        if !session.is_paid() {
            return Err(ServiceError::PaymentFailed(
                "Payment not completed".to_string(),
            ));
        }

        // Authoritative duplicate check, needed whenever the cache has been
        // cleared since the first confirmation.
        if let Some(existing) = self.orders.find_by_session_id(session_id).await? {
            self.processed.insert(session_id);
            return Ok(self.replay(existing, session_id).await);
        }

        let metadata = SessionMetadata::decode(&session.metadata)?;
        let owner_id = resolve_owner(identity, metadata.initiating_user_id);
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            owner_id: Set(owner_id),
            address: Set(metadata.address.clone()),
            amount: Set(metadata.amount),
            status: Set(OrderStatus::Placed),
            payment_method: Set(PAYMENT_METHOD.to_string()),
            paid: Set(true),
            gateway_session_id: Set(session_id.to_string()),
            gateway_charge_ref: Set(session.payment_intent.clone()),
            tracking_url: Set(None),
            invoice_url: Set(None),
            created_at: Set(now),
        };

        let txn = self.db.begin().await?;
        match order::Entity::insert(order_model).exec(&txn).await {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                // A concurrent confirmation won the insert. Treat this call
                // as a replay of the winning order.
                txn.rollback().await?;
                self.processed.insert(session_id);
                let existing = self
                    .orders
                    .find_by_session_id(session_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "duplicate insert for session {} but no order found",
                            session_id
                        ))
                    })?;
                return Ok(self.replay(existing, session_id).await);
            }
            Err(err) => {
                txn.rollback().await?;
                return Err(err.into());
            }
        }

        if !metadata.items.is_empty() {
            let lines: Vec<order_item::ActiveModel> = metadata
                .items
                .iter()
                .enumerate()
                .map(|(position, item)| order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_id: Set(item.product_id),
                    name: Set(item.name.clone()),
                    unit_price: Set(item.unit_price),
                    quantity: Set(item.quantity),
                    image_url: Set(item.image_url.clone()),
                    position: Set(position as i32),
                })
                .collect();
            order_item::Entity::insert_many(lines).exec(&txn).await?;
        }
        txn.commit().await?;

        self.processed.insert(session_id);
        info!(order_id = %order_id, session_id, "Order settled");
        let _ = self.event_sender.send(Event::OrderCreated(order_id)).await;

        let side_effects = self.run_side_effects(&metadata).await;

        let record = self
            .orders
            .find_by_session_id(session_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "order for session {} vanished after commit",
                    session_id
                ))
            })?;

        Ok(ConfirmOutcome {
            order: record,
            replayed: false,
            side_effects,
        })
    }

    /// Inventory and commission run only after the order is durable; their
    /// failures are recorded in the report, never propagated.
    async fn run_side_effects(&self, metadata: &SessionMetadata) -> SettlementReport {
        let inventory = self.inventory.decrement_for_items(&metadata.items).await;

        let commission = match &metadata.affiliate_code {
            Some(code) => match self.affiliates.credit_sale(code, self.commission).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(code = %code, error = %err, "Commission accrual failed after order commit");
                    let _ = self
                        .event_sender
                        .send(Event::CommissionAccrualFailed {
                            affiliate_code: code.clone(),
                            reason: err.to_string(),
                        })
                        .await;
                    Some(CommissionOutcome {
                        affiliate_code: code.clone(),
                        commission: self.commission,
                        applied: false,
                        reason: Some(err.to_string()),
                    })
                }
            },
            None => None,
        };

        SettlementReport {
            inventory,
            commission,
        }
    }

    async fn replay(&self, existing: OrderRecord, session_id: &str) -> ConfirmOutcome {
        let _ = self
            .event_sender
            .send(Event::OrderReplayed {
                order_id: existing.id,
                gateway_session_id: session_id.to_string(),
            })
            .await;
        ConfirmOutcome {
            order: existing,
            replayed: true,
            side_effects: SettlementReport::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_set_is_add_only_until_cleared() {
        let processed = ProcessedSessions::new();
        assert!(!processed.contains("cs_1"));

        processed.insert("cs_1");
        processed.insert("cs_1");
        assert!(processed.contains("cs_1"));
        assert_eq!(processed.len(), 1);

        processed.clear();
        assert!(processed.is_empty());
        assert!(!processed.contains("cs_1"));
    }

    #[test]
    fn request_identity_wins_over_session_identity() {
        let request = Uuid::new_v4();
        let session = Uuid::new_v4();

        assert_eq!(resolve_owner(Some(request), Some(session)), Some(request));
        assert_eq!(resolve_owner(None, Some(session)), Some(session));
        assert_eq!(resolve_owner(None, None), None);
    }
}
