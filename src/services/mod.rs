pub mod affiliates;
pub mod carts;
pub mod checkout;
pub mod inventory;
pub mod orders;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;

use affiliates::AffiliateService;
use carts::CartService;
use checkout::{CheckoutService, ProcessedSessions};
use inventory::InventoryService;
use orders::OrderService;

/// All services wired against one database pool and event channel.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub carts: CartService,
}

impl AppServices {
    pub fn build(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        processed: ProcessedSessions,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        let inventory = InventoryService::new(db.clone(), event_sender.clone());
        let affiliates = AffiliateService::new(db.clone(), event_sender.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone());
        let carts = CartService::new(db.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            db,
            gateway,
            inventory,
            affiliates,
            orders.clone(),
            processed,
            event_sender,
            config.currency.clone(),
            config.frontend_url.clone(),
            affiliates::commission_amount(config.affiliate_commission),
        );

        Self {
            checkout,
            orders,
            carts,
        }
    }
}
