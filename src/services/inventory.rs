use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::product;
use crate::events::{Event, EventSender};
use crate::gateway::CheckoutItem;

/// Per-line result of a stock decrement attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryOutcome {
    pub product_id: Uuid,
    pub quantity: i32,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Best-effort stock adjustment. Runs after the order is durably committed,
/// so failures here are reported and logged rather than propagated.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Decrements stock for each order line with a single guarded UPDATE per
    /// line, so stock never goes below zero and concurrent confirmations
    /// never read stale counts.
    #[instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn decrement_for_items(&self, items: &[CheckoutItem]) -> Vec<InventoryOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push(self.decrement_line(item).await);
        }
        outcomes
    }

    async fn decrement_line(&self, item: &CheckoutItem) -> InventoryOutcome {
        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Inventory,
                Expr::col(product::Column::Inventory).sub(item.quantity),
            )
            .filter(product::Column::Id.eq(item.product_id))
            .filter(product::Column::Inventory.gte(item.quantity))
            .exec(self.db.as_ref())
            .await;

        match result {
            Ok(update) if update.rows_affected > 0 => {
                let _ = self
                    .event_sender
                    .send(Event::InventoryDecremented {
                        product_id: item.product_id,
                        quantity: item.quantity,
                    })
                    .await;
                InventoryOutcome {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    applied: true,
                    reason: None,
                }
            }
            Ok(_) => {
                self.report_failure(item, "product missing or insufficient stock")
                    .await
            }
            Err(err) => {
                warn!(
                    product_id = %item.product_id,
                    error = %err,
                    "Inventory decrement query failed"
                );
                self.report_failure(item, &err.to_string()).await
            }
        }
    }

    async fn report_failure(&self, item: &CheckoutItem, reason: &str) -> InventoryOutcome {
        let _ = self
            .event_sender
            .send(Event::InventoryDecrementFailed {
                product_id: item.product_id,
                quantity: item.quantity,
                reason: reason.to_string(),
            })
            .await;
        InventoryOutcome {
            product_id: item.product_id,
            quantity: item.quantity,
            applied: false,
            reason: Some(reason.to_string()),
        }
    }
}
