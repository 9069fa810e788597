use crate::application::allocator::ToyBoxAllocator;
use crate::application::inventory::InventoryLedger;
use crate::application::ledger::PaymentLedger;
use crate::application::payments::PaymentEngine;
use crate::application::providers::click::ClickAdapter;
use crate::application::providers::payme::PaymeAdapter;
use crate::application::providers::CallbackRouter;
use crate::application::subscriptions::SubscriptionService;
use crate::config::Settings;
use crate::domain::ports::{ClockRef, DatabaseRef, GatewayRef, ToyBoxRepository};
use crate::domain::toy_box::ToyBox;
use crate::error::Result;
use std::sync::Arc;

/// Wires every service over one database, clock and gateway.
///
/// Cloning is cheap; clones share storage.
#[derive(Clone)]
pub struct FulfillmentEngine {
    db: DatabaseRef,
    settings: Arc<Settings>,
    subscriptions: SubscriptionService,
    allocator: ToyBoxAllocator,
    payments: PaymentEngine,
    inventory: InventoryLedger,
    callbacks: CallbackRouter,
}

impl FulfillmentEngine {
    pub fn new(db: DatabaseRef, clock: ClockRef, gateway: GatewayRef, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let ledger = PaymentLedger::new(settings.clone());
        let callbacks = CallbackRouter::new()
            .register(Arc::new(ClickAdapter::new(
                db.clone(),
                clock.clone(),
                ledger.clone(),
            )))
            .register(Arc::new(PaymeAdapter::new(
                db.clone(),
                clock.clone(),
                ledger.clone(),
            )));

        Self {
            subscriptions: SubscriptionService::new(db.clone(), clock.clone()),
            allocator: ToyBoxAllocator::new(db.clone(), clock.clone(), settings.clone()),
            payments: PaymentEngine::new(db.clone(), clock, gateway, ledger),
            inventory: InventoryLedger::new(db.clone()),
            callbacks,
            settings,
            db,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.subscriptions
    }

    pub fn allocator(&self) -> &ToyBoxAllocator {
        &self.allocator
    }

    pub fn payments(&self) -> &PaymentEngine {
        &self.payments
    }

    pub fn inventory(&self) -> &InventoryLedger {
        &self.inventory
    }

    pub fn callbacks(&self) -> &CallbackRouter {
        &self.callbacks
    }

    /// Every box, oldest first.
    pub async fn all_toy_boxes(&self) -> Result<Vec<ToyBox>> {
        let mut uow = self.db.begin().await?;
        uow.all_toy_boxes().await
    }
}
