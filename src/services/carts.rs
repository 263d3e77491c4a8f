use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, Set};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::cart;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Empties the caller's persisted cart. Upserts so a user who never had
    /// a cart row still ends up with an empty one; the operation is
    /// idempotent either way.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let empty = cart::ActiveModel {
            user_id: Set(user_id),
            items: Set(json!({})),
            updated_at: Set(Utc::now()),
        };

        cart::Entity::insert(empty)
            .on_conflict(
                OnConflict::column(cart::Column::UserId)
                    .update_columns([cart::Column::Items, cart::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        info!(user_id = %user_id, "Cart cleared");
        let _ = self.event_sender.send(Event::CartCleared(user_id)).await;
        Ok(())
    }
}
