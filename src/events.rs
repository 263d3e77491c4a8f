use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Events emitted by the settlement core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutSessionOpened {
        gateway_session_id: String,
        amount: Decimal,
    },
    OrderCreated(Uuid),
    OrderReplayed {
        order_id: Uuid,
        gateway_session_id: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    InventoryDecremented {
        product_id: Uuid,
        quantity: i32,
    },
    InventoryDecrementFailed {
        product_id: Uuid,
        quantity: i32,
        reason: String,
    },
    CommissionAccrued {
        affiliate_code: String,
        commission: Decimal,
    },
    CommissionAccrualFailed {
        affiliate_code: String,
        reason: String,
    },
    CartCleared(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Consumes events from the channel and logs them. Post-commit drift
/// (failed inventory decrements or commission credits) is logged at error
/// level so operational tooling can pick it up.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::InventoryDecrementFailed {
                product_id,
                quantity,
                reason,
            } => {
                error!(
                    product_id = %product_id,
                    quantity = quantity,
                    reason = %reason,
                    "Inventory decrement failed after order commit"
                );
            }
            Event::CommissionAccrualFailed {
                affiliate_code,
                reason,
            } => {
                error!(
                    affiliate_code = %affiliate_code,
                    reason = %reason,
                    "Commission accrual failed after order commit"
                );
            }
            other => {
                info!(event = ?other, "Event processed");
            }
        }
    }
    info!("Event channel closed; event processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        let order_id = Uuid::new_v4();
        sender.send(Event::OrderCreated(order_id)).await.unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender.send(Event::OrderCreated(Uuid::new_v4())).await.is_err());
    }
}
