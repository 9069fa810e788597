use crate::domain::catalog::{Category, CategoryId, Inventory};
use crate::domain::customer::{
    Child, ChildId, DeliveryInfo, DeliveryInfoId, NewChild, NewDeliveryInfo,
};
use crate::domain::payment::{NewPayment, Payment, PaymentId, UserId};
use crate::domain::ports::{
    CatalogRepository, CustomerRepository, Database, PaymentKey, PaymentRepository,
    SubscriptionRepository, ToyBoxRepository, UnitOfWork, UnitOfWorkBox,
};
use crate::domain::subscription::{
    NewSubscription, PlanId, Subscription, SubscriptionId, SubscriptionPlan,
};
use crate::domain::toy_box::{NewToyBox, ToyBox, ToyBoxId};
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Every row the system stores, keyed by integer id.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub payments: BTreeMap<PaymentId, Payment>,
    pub subscriptions: BTreeMap<SubscriptionId, Subscription>,
    pub children: BTreeMap<ChildId, Child>,
    pub delivery_infos: BTreeMap<DeliveryInfoId, DeliveryInfo>,
    pub plans: BTreeMap<PlanId, SubscriptionPlan>,
    pub categories: BTreeMap<CategoryId, Category>,
    pub inventory: BTreeMap<CategoryId, Inventory>,
    pub toy_boxes: BTreeMap<ToyBoxId, ToyBox>,
}

fn next_id<V>(table: &BTreeMap<i64, V>) -> i64 {
    table.keys().next_back().map_or(1, |last| last + 1)
}

/// Receives the committed state of a unit of work before it becomes visible.
///
/// Used by durable backends to mirror the in-memory tables.
#[async_trait]
pub trait Journal: Send + Sync {
    async fn persist(&self, before: &Tables, after: &Tables) -> Result<()>;
}

/// A transactional in-memory database.
///
/// Units of work hold an owned lock on the tables for their whole lifetime
/// and mutate a private copy, so they are serializable and roll back for free
/// when dropped. `Clone` shares the underlying tables.
#[derive(Default, Clone)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    journal: Option<Arc<dyn Journal>>,
}

impl InMemoryDatabase {
    /// Creates a new, empty database.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: Tables) -> Self {
        Self {
            tables: Arc::new(Mutex::new(tables)),
            journal: None,
        }
    }

    /// Database whose commits are written through `journal` first.
    pub fn with_journal(tables: Tables, journal: Arc<dyn Journal>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(tables)),
            journal: Some(journal),
        }
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn begin(&self) -> Result<UnitOfWorkBox> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            committed: guard,
            working,
            journal: self.journal.clone(),
        }))
    }
}

pub struct InMemoryUnitOfWork {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
    journal: Option<Arc<dyn Journal>>,
}

impl InMemoryUnitOfWork {
    fn check_unique(&self, payment: &Payment) -> Result<()> {
        let keys = payment.unique_keys();
        for other in self.working.payments.values().filter(|p| p.id != payment.id) {
            let taken = other.unique_keys();
            if let Some((name, value)) = keys.iter().find(|key| taken.contains(key)) {
                return Err(FulfillmentError::Conflict(format!(
                    "{name} {value} is already used by payment {}",
                    other.id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryUnitOfWork {
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        let payment = payment.into_payment(next_id(&self.working.payments));
        self.check_unique(&payment)?;
        self.working.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        if !self.working.payments.contains_key(&payment.id) {
            return Err(FulfillmentError::not_found("payment", payment.id));
        }
        self.check_unique(payment)?;
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.working.payments.get(&id).cloned())
    }

    async fn find_payment(&mut self, key: PaymentKey) -> Result<Option<Payment>> {
        let found = self.working.payments.values().find(|p| match &key {
            PaymentKey::External(id) => &p.external_id == id,
            PaymentKey::MerchantTrans(id) => p.merchant_trans_id.as_ref() == Some(id),
            PaymentKey::MerchantPrepare(id) => p.merchant_prepare_id == Some(*id),
            PaymentKey::PaymeReceipt(id) => p.payme_receipt_id.as_ref() == Some(id),
        });
        Ok(found.cloned())
    }

    async fn all_payments(&mut self) -> Result<Vec<Payment>> {
        Ok(self.working.payments.values().cloned().collect())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryUnitOfWork {
    async fn insert_subscription(&mut self, subscription: NewSubscription) -> Result<Subscription> {
        let subscription = subscription.into_subscription(next_id(&self.working.subscriptions));
        self.working
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn update_subscription(&mut self, subscription: &Subscription) -> Result<()> {
        match self.working.subscriptions.get_mut(&subscription.id) {
            Some(row) => {
                *row = subscription.clone();
                Ok(())
            }
            None => Err(FulfillmentError::not_found("subscription", subscription.id)),
        }
    }

    async fn subscription(&mut self, id: SubscriptionId) -> Result<Option<Subscription>> {
        Ok(self.working.subscriptions.get(&id).cloned())
    }

    async fn subscriptions_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<Subscription>> {
        Ok(self
            .working
            .subscriptions
            .values()
            .filter(|s| s.payment_id == Some(payment_id))
            .cloned()
            .collect())
    }

    async fn subscriptions_for_child(&mut self, child_id: ChildId) -> Result<Vec<Subscription>> {
        Ok(self
            .working
            .subscriptions
            .values()
            .filter(|s| s.child_id == child_id)
            .cloned()
            .collect())
    }

    async fn all_subscriptions(&mut self) -> Result<Vec<Subscription>> {
        Ok(self.working.subscriptions.values().cloned().collect())
    }
}

#[async_trait]
impl CustomerRepository for InMemoryUnitOfWork {
    async fn insert_child(&mut self, child: NewChild) -> Result<Child> {
        let child = child.into_child(next_id(&self.working.children));
        self.working.children.insert(child.id, child.clone());
        Ok(child)
    }

    async fn update_child(&mut self, child: &Child) -> Result<()> {
        match self.working.children.get_mut(&child.id) {
            Some(row) => {
                *row = child.clone();
                Ok(())
            }
            None => Err(FulfillmentError::not_found("child", child.id)),
        }
    }

    async fn child(&mut self, id: ChildId) -> Result<Option<Child>> {
        Ok(self.working.children.get(&id).cloned())
    }

    async fn children_of(&mut self, user_id: UserId) -> Result<Vec<Child>> {
        Ok(self
            .working
            .children
            .values()
            .filter(|c| c.parent_id == user_id && !c.is_deleted)
            .cloned()
            .collect())
    }

    async fn insert_delivery_info(&mut self, info: NewDeliveryInfo) -> Result<DeliveryInfo> {
        let info = info.into_delivery_info(next_id(&self.working.delivery_infos));
        self.working.delivery_infos.insert(info.id, info.clone());
        Ok(info)
    }

    async fn delivery_info(&mut self, id: DeliveryInfoId) -> Result<Option<DeliveryInfo>> {
        Ok(self.working.delivery_infos.get(&id).cloned())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryUnitOfWork {
    async fn upsert_plan(&mut self, plan: SubscriptionPlan) -> Result<()> {
        self.working.plans.insert(plan.id, plan);
        Ok(())
    }

    async fn plan(&mut self, id: PlanId) -> Result<Option<SubscriptionPlan>> {
        Ok(self.working.plans.get(&id).cloned())
    }

    async fn plans(&mut self) -> Result<Vec<SubscriptionPlan>> {
        Ok(self.working.plans.values().cloned().collect())
    }

    async fn upsert_category(&mut self, category: Category) -> Result<()> {
        self.working.categories.insert(category.id, category);
        Ok(())
    }

    async fn categories(&mut self) -> Result<Vec<Category>> {
        Ok(self.working.categories.values().cloned().collect())
    }

    async fn inventory(&mut self, category_id: CategoryId) -> Result<Option<Inventory>> {
        Ok(self.working.inventory.get(&category_id).copied())
    }

    async fn update_inventory(&mut self, inventory: Inventory) -> Result<()> {
        self.working.inventory.insert(inventory.category_id, inventory);
        Ok(())
    }

    async fn inventories(&mut self) -> Result<Vec<Inventory>> {
        Ok(self.working.inventory.values().copied().collect())
    }
}

#[async_trait]
impl ToyBoxRepository for InMemoryUnitOfWork {
    async fn insert_toy_box(&mut self, toy_box: NewToyBox) -> Result<ToyBox> {
        let toy_box = toy_box.into_toy_box(next_id(&self.working.toy_boxes));
        self.working.toy_boxes.insert(toy_box.id, toy_box.clone());
        Ok(toy_box)
    }

    async fn update_toy_box(&mut self, toy_box: &ToyBox) -> Result<()> {
        match self.working.toy_boxes.get_mut(&toy_box.id) {
            Some(row) => {
                *row = toy_box.clone();
                Ok(())
            }
            None => Err(FulfillmentError::not_found("toy box", toy_box.id)),
        }
    }

    async fn toy_box(&mut self, id: ToyBoxId) -> Result<Option<ToyBox>> {
        Ok(self.working.toy_boxes.get(&id).cloned())
    }

    async fn boxes_for_child(&mut self, child_id: ChildId) -> Result<Vec<ToyBox>> {
        Ok(self
            .working
            .toy_boxes
            .values()
            .rev()
            .filter(|b| b.child_id == child_id)
            .cloned()
            .collect())
    }

    async fn boxes_for_subscription(
        &mut self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<ToyBox>> {
        Ok(self
            .working
            .toy_boxes
            .values()
            .filter(|b| b.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    async fn all_toy_boxes(&mut self) -> Result<Vec<ToyBox>> {
        Ok(self.working.toy_boxes.values().cloned().collect())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(&mut self) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.persist(&self.committed, &self.working).await?;
        }
        *self.committed = self.working.clone();
        Ok(())
    }
}
