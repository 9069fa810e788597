use super::catalog::{Category, CategoryId, Inventory};
use super::customer::{Child, ChildId, DeliveryInfo, DeliveryInfoId, NewChild, NewDeliveryInfo};
use super::payment::{NewPayment, Payment, PaymentId, UserId};
use super::subscription::{NewSubscription, PlanId, Subscription, SubscriptionId, SubscriptionPlan};
use super::toy_box::{NewToyBox, ToyBox, ToyBoxId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Correlation ids a payment can be looked up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentKey {
    External(String),
    MerchantTrans(String),
    MerchantPrepare(i64),
    PaymeReceipt(String),
}

#[async_trait]
pub trait PaymentRepository: Send {
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment>;
    /// Fails with `Conflict` if a correlation id is already taken by another row.
    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;
    async fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>>;
    async fn find_payment(&mut self, key: PaymentKey) -> Result<Option<Payment>>;
    async fn all_payments(&mut self) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait SubscriptionRepository: Send {
    async fn insert_subscription(&mut self, subscription: NewSubscription) -> Result<Subscription>;
    async fn update_subscription(&mut self, subscription: &Subscription) -> Result<()>;
    async fn subscription(&mut self, id: SubscriptionId) -> Result<Option<Subscription>>;
    async fn subscriptions_for_payment(&mut self, payment_id: PaymentId)
    -> Result<Vec<Subscription>>;
    async fn subscriptions_for_child(&mut self, child_id: ChildId) -> Result<Vec<Subscription>>;
    async fn all_subscriptions(&mut self) -> Result<Vec<Subscription>>;
}

#[async_trait]
pub trait CustomerRepository: Send {
    async fn insert_child(&mut self, child: NewChild) -> Result<Child>;
    async fn update_child(&mut self, child: &Child) -> Result<()>;
    async fn child(&mut self, id: ChildId) -> Result<Option<Child>>;
    /// Children of a parent that are not soft-deleted, oldest first.
    async fn children_of(&mut self, user_id: UserId) -> Result<Vec<Child>>;
    async fn insert_delivery_info(&mut self, info: NewDeliveryInfo) -> Result<DeliveryInfo>;
    async fn delivery_info(&mut self, id: DeliveryInfoId) -> Result<Option<DeliveryInfo>>;
}

#[async_trait]
pub trait CatalogRepository: Send {
    async fn upsert_plan(&mut self, plan: SubscriptionPlan) -> Result<()>;
    async fn plan(&mut self, id: PlanId) -> Result<Option<SubscriptionPlan>>;
    async fn plans(&mut self) -> Result<Vec<SubscriptionPlan>>;
    async fn upsert_category(&mut self, category: Category) -> Result<()>;
    /// All categories in id order.
    async fn categories(&mut self) -> Result<Vec<Category>>;
    async fn inventory(&mut self, category_id: CategoryId) -> Result<Option<Inventory>>;
    async fn update_inventory(&mut self, inventory: Inventory) -> Result<()>;
    async fn inventories(&mut self) -> Result<Vec<Inventory>>;
}

#[async_trait]
pub trait ToyBoxRepository: Send {
    async fn insert_toy_box(&mut self, toy_box: NewToyBox) -> Result<ToyBox>;
    async fn update_toy_box(&mut self, toy_box: &ToyBox) -> Result<()>;
    async fn toy_box(&mut self, id: ToyBoxId) -> Result<Option<ToyBox>>;
    /// Boxes of a child, newest first.
    async fn boxes_for_child(&mut self, child_id: ChildId) -> Result<Vec<ToyBox>>;
    async fn boxes_for_subscription(
        &mut self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<ToyBox>>;
    async fn all_toy_boxes(&mut self) -> Result<Vec<ToyBox>>;
}

/// One atomic unit of work over every repository.
///
/// Nothing is visible to other units until `commit` succeeds. Dropping a unit
/// without committing discards its changes.
#[async_trait]
pub trait UnitOfWork:
    PaymentRepository
    + SubscriptionRepository
    + CustomerRepository
    + CatalogRepository
    + ToyBoxRepository
    + Send
{
    async fn commit(&mut self) -> Result<()>;
}

pub type UnitOfWorkBox = Box<dyn UnitOfWork>;

#[async_trait]
pub trait Database: Send + Sync {
    /// Opens a unit of work. Units are serialized against each other.
    async fn begin(&self) -> Result<UnitOfWorkBox>;
}

pub type DatabaseRef = Arc<dyn Database>;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub type ClockRef = Arc<dyn Clock>;

/// Status vocabulary shared by the mock gateway and its webhooks.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Succeeded,
    Failed,
    Refunded,
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOutcome {
    pub status: GatewayStatus,
    pub message: Option<String>,
}

/// Third-party gateway used by the mock provider flow.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers a payment and returns the gateway's id for it.
    fn register(&self, amount: Decimal, currency: &str) -> String;
    /// Asks the gateway to settle a registered payment. May take a while.
    async fn settle(&self, external_id: &str, amount: Decimal) -> GatewayOutcome;
}

pub type GatewayRef = Arc<dyn PaymentGateway>;
