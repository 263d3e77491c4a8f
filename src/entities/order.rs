use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fulfilment status of an order. Writable by admins only; any state is
/// reachable from any other so that operators can correct mistakes.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "Placed")]
    Placed,
    #[sea_orm(string_value = "Packing")]
    Packing,
    #[sea_orm(string_value = "Shipped")]
    Shipped,
    #[sea_orm(string_value = "OutForDelivery")]
    OutForDelivery,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
}

impl OrderStatus {
    /// Parse an admin-supplied status label; unknown labels are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Placed" => Some(Self::Placed),
            "Packing" => Some(Self::Packing),
            "Shipped" => Some(Self::Shipped),
            "OutForDelivery" => Some(Self::OutForDelivery),
            "Delivered" => Some(Self::Delivered),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placed => "Placed",
            Self::Packing => "Packing",
            Self::Shipped => "Shipped",
            Self::OutForDelivery => "OutForDelivery",
            Self::Delivered => "Delivered",
        }
    }
}

/// A settled order. Immutable after creation except for `status`,
/// `tracking_url` and `invoice_url`, which are admin-writable.
///
/// `gateway_session_id` carries a unique index and doubles as the
/// idempotency key for payment confirmation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// `None` denotes a guest order.
    pub owner_id: Option<Uuid>,

    /// Free-form shipping/contact record, snapshotted at confirmation time.
    pub address: Json,

    /// Total charged; equals the amount authorized by the gateway session.
    pub amount: Decimal,

    pub status: OrderStatus,
    pub payment_method: String,
    pub paid: bool,

    #[sea_orm(unique)]
    pub gateway_session_id: String,
    pub gateway_charge_ref: Option<String>,

    pub tracking_url: Option<String>,
    pub invoice_url: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip() {
        for status in [
            OrderStatus::Placed,
            OrderStatus::Packing,
            OrderStatus::Shipped,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_status_label_is_rejected() {
        assert_eq!(OrderStatus::parse("Cancelled"), None);
        assert_eq!(OrderStatus::parse(""), None);
        assert_eq!(OrderStatus::parse("placed"), None);
    }
}
