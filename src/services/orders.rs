use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{order, order_item};
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// One order line as presented to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRecord {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// An order with its lines, as presented to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub address: serde_json::Value,
    pub amount: Decimal,
    pub status: String,
    pub payment_method: String,
    pub paid: bool,
    pub gateway_session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderLineRecord>,
}

impl OrderRecord {
    pub fn from_models(order: order::Model, mut items: Vec<order_item::Model>) -> Self {
        items.sort_by_key(|item| item.position);
        Self {
            id: order.id,
            owner_id: order.owner_id,
            address: order.address,
            amount: order.amount,
            status: order.status.as_str().to_string(),
            payment_method: order.payment_method,
            paid: order.paid,
            gateway_session_id: order.gateway_session_id,
            tracking_url: order.tracking_url,
            invoice_url: order.invoice_url,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|item| OrderLineRecord {
                    product_id: item.product_id,
                    name: item.name,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                    image_url: item.image_url,
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Every order in the system, newest first. Admin surface.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<OrderRecord>, ServiceError> {
        let orders = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        self.assemble(orders).await
    }

    /// The caller's own orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderRecord>, ServiceError> {
        let orders = order::Entity::find()
            .filter(order::Column::OwnerId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        self.assemble(orders).await
    }

    pub async fn find_by_session_id(
        &self,
        gateway_session_id: &str,
    ) -> Result<Option<OrderRecord>, ServiceError> {
        let Some(found) = order::Entity::find()
            .filter(order::Column::GatewaySessionId.eq(gateway_session_id))
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };
        let items = self.items_for(found.id).await?;
        Ok(Some(OrderRecord::from_models(found, items)))
    }

    /// Sets the fulfilment status. Unknown labels are rejected; any known
    /// status may replace any other.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        status_label: &str,
    ) -> Result<order::Model, ServiceError> {
        let status = OrderStatus::parse(status_label).ok_or_else(|| {
            ServiceError::InvalidInput(format!("unknown order status '{}'", status_label))
        })?;

        let existing = self.require(order_id).await?;
        let old_status = existing.status;

        let mut active: order::ActiveModel = existing.into();
        active.status = Set(status);
        let updated = active.update(self.db.as_ref()).await?;

        info!(order_id = %order_id, status = status.as_str(), "Order status updated");
        let _ = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: status.as_str().to_string(),
            })
            .await;
        Ok(updated)
    }

    /// Replaces the shipment tracking URL wholesale.
    #[instrument(skip(self))]
    pub async fn update_tracking_url(
        &self,
        order_id: Uuid,
        tracking_url: String,
    ) -> Result<order::Model, ServiceError> {
        let existing = self.require(order_id).await?;
        let mut active: order::ActiveModel = existing.into();
        active.tracking_url = Set(Some(tracking_url));
        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Replaces the invoice URL wholesale.
    #[instrument(skip(self))]
    pub async fn update_invoice_url(
        &self,
        order_id: Uuid,
        invoice_url: String,
    ) -> Result<order::Model, ServiceError> {
        let existing = self.require(order_id).await?;
        let mut active: order::ActiveModel = existing.into();
        active.invoice_url = Set(Some(invoice_url));
        Ok(active.update(self.db.as_ref()).await?)
    }

    async fn require(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn items_for(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(self.db.as_ref())
            .await?)
    }

    /// Attaches lines to an already-ordered set of orders, preserving that
    /// order.
    async fn assemble(&self, orders: Vec<order::Model>) -> Result<Vec<OrderRecord>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .all(self.db.as_ref())
            .await?;
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|o| {
                let lines = by_order.remove(&o.id).unwrap_or_default();
                OrderRecord::from_models(o, lines)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn record_sorts_lines_by_cart_position() {
        let order_id = Uuid::new_v4();
        let base = order::Model {
            id: order_id,
            owner_id: None,
            address: json!({}),
            amount: dec!(30),
            status: OrderStatus::Placed,
            payment_method: "Stripe".into(),
            paid: true,
            gateway_session_id: "cs_test_sort".into(),
            gateway_charge_ref: None,
            tracking_url: None,
            invoice_url: None,
            created_at: Utc::now(),
        };

        let line = |name: &str, position: i32| order_item::Model {
            id: Uuid::new_v4(),
            order_id,
            product_id: Uuid::new_v4(),
            name: name.into(),
            unit_price: dec!(10),
            quantity: 1,
            image_url: None,
            position,
        };

        let record =
            OrderRecord::from_models(base, vec![line("second", 1), line("first", 0)]);
        assert_eq!(record.items[0].name, "first");
        assert_eq!(record.items[1].name, "second");
    }
}
