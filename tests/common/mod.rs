#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use toybox_fulfillment::application::engine::FulfillmentEngine;
use toybox_fulfillment::application::providers::RawCallback;
use toybox_fulfillment::application::providers::click::{ClickCallback, click_signature};
use toybox_fulfillment::config::Settings;
use toybox_fulfillment::domain::customer::Child;
use toybox_fulfillment::domain::payment::{Payment, PaymentProvider, UserId};
use toybox_fulfillment::domain::subscription::{PlanId, Subscription, SubscriptionId, SubscriptionStatus};
use toybox_fulfillment::domain::toy_box::ToyBox;
use toybox_fulfillment::infrastructure::clock::FixedClock;
use toybox_fulfillment::infrastructure::gateway::MockGateway;
use toybox_fulfillment::infrastructure::in_memory::InMemoryDatabase;
use toybox_fulfillment::infrastructure::seed::seed_demo_catalog;

pub const USER: UserId = 1;
pub const CLICK_SECRET: &str = "click-secret";
pub const PAYME_SECRET: &str = "payme-secret";

pub fn tags(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn production_settings() -> Settings {
    Settings {
        click_service_id: Some(77),
        click_secret_key: Some(CLICK_SECRET.to_string()),
        payme_secret_key: Some(PAYME_SECRET.to_string()),
        ..Settings::production()
    }
}

pub struct TestApp {
    pub engine: FulfillmentEngine,
    pub db: Arc<InMemoryDatabase>,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with(Settings::default(), MockGateway::always_succeeds()).await
    }

    pub async fn production() -> Self {
        Self::with(production_settings(), MockGateway::always_succeeds()).await
    }

    pub async fn with(settings: Settings, gateway: MockGateway) -> Self {
        let db = Arc::new(InMemoryDatabase::new());
        seed_demo_catalog(db.as_ref()).await.unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
        ));
        let engine = FulfillmentEngine::new(db.clone(), clock.clone(), Arc::new(gateway), settings);
        Self { engine, db, clock }
    }

    /// Registers a child for [`USER`] and orders `plan_id` for it.
    pub async fn subscribe(
        &self,
        name: &str,
        interests: &[&str],
        skills: &[&str],
        plan_id: PlanId,
    ) -> (Child, Subscription) {
        let subscriptions = self.engine.subscriptions();
        let child = subscriptions
            .register_child(USER, name, tags(interests), tags(skills))
            .await
            .unwrap();
        let subscription = subscriptions
            .order_subscription(USER, child.id, plan_id, None)
            .await
            .unwrap();
        (child, subscription)
    }

    pub async fn checkout(&self, ids: &[SubscriptionId], provider: PaymentProvider) -> Payment {
        self.engine
            .payments()
            .checkout(USER, ids, provider)
            .await
            .unwrap()
    }

    pub async fn status(&self, subscription_id: SubscriptionId) -> SubscriptionStatus {
        self.engine
            .subscriptions()
            .subscription(subscription_id)
            .await
            .unwrap()
            .status
    }

    pub async fn boxes(&self) -> Vec<ToyBox> {
        self.engine.all_toy_boxes().await.unwrap()
    }

    pub async fn click(&self, callback: &ClickCallback) -> Value {
        let body = serde_json::to_string(callback).unwrap();
        self.engine
            .callbacks()
            .dispatch(PaymentProvider::Click, RawCallback::new(body))
            .await
            .unwrap()
    }

    pub async fn payme(&self, callback: RawCallback) -> Value {
        self.engine
            .callbacks()
            .dispatch(PaymentProvider::Payme, callback)
            .await
            .unwrap()
    }
}

/// A Click callback for `payment`, signed with [`CLICK_SECRET`].
pub fn click_callback(payment: &Payment, action: i32) -> ClickCallback {
    let mut callback = ClickCallback {
        click_trans_id: 9001,
        service_id: 77,
        click_paydoc_id: Some(42),
        merchant_trans_id: payment.merchant_trans_id.clone().unwrap_or_default(),
        merchant_prepare_id: (action == 1).then_some(payment.id),
        amount: payment.amount,
        action,
        error: 0,
        error_note: String::new(),
        sign_time: "2026-03-02 10:00:00".to_string(),
        sign_string: String::new(),
    };
    sign_click(&mut callback);
    callback
}

pub fn sign_click(callback: &mut ClickCallback) {
    callback.sign_string = click_signature(CLICK_SECRET, callback);
}
