use crate::domain::customer::{Child, ChildId, DeliveryInfo, NewChild, NewDeliveryInfo};
use crate::domain::payment::UserId;
use crate::domain::ports::{
    CatalogRepository, ClockRef, CustomerRepository, DatabaseRef, PaymentRepository,
    SubscriptionRepository, UnitOfWork,
};
use crate::domain::subscription::{
    NewSubscription, PlanId, Subscription, SubscriptionId, SubscriptionStatus,
    discount_for_position, discounted_price,
};
use crate::error::{FulfillmentError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// A subscription row together with its status at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub status: SubscriptionStatus,
}

/// Derives the status of `subscription` from its linked payment.
pub async fn status_in(
    uow: &mut dyn UnitOfWork,
    subscription: &Subscription,
    now: DateTime<Utc>,
) -> Result<SubscriptionStatus> {
    let payment = match subscription.payment_id {
        Some(payment_id) => uow.payment(payment_id).await?,
        None => None,
    };
    Ok(subscription.status(payment.as_ref(), now))
}

/// Loads a live child and checks it belongs to `user_id`.
pub async fn owned_child_in(
    uow: &mut dyn UnitOfWork,
    child_id: ChildId,
    user_id: UserId,
) -> Result<Child> {
    let child = uow
        .child(child_id)
        .await?
        .filter(|c| !c.is_deleted)
        .ok_or_else(|| FulfillmentError::not_found("child", child_id))?;
    if child.parent_id != user_id {
        return Err(FulfillmentError::validation(format!(
            "child {child_id} does not belong to user {user_id}"
        )));
    }
    Ok(child)
}

/// Reassigns sibling discounts for every live child of `user_id`.
///
/// Children are ordered by creation; the first pays full price. Only
/// subscriptions whose price is not tied to a pending or settled payment are
/// repriced. Returns how many subscriptions changed.
pub async fn recalculate_discounts_in(uow: &mut dyn UnitOfWork, user_id: UserId) -> Result<usize> {
    let children = uow.children_of(user_id).await?;
    let mut changed = 0;

    for (position, child) in children.iter().enumerate() {
        let discount = discount_for_position(position);
        for mut subscription in uow.subscriptions_for_child(child.id).await? {
            let payment = match subscription.payment_id {
                Some(payment_id) => uow.payment(payment_id).await?,
                None => None,
            };
            if !subscription.is_repriceable(payment.as_ref()) {
                continue;
            }
            let plan = uow
                .plan(subscription.plan_id)
                .await?
                .ok_or_else(|| FulfillmentError::not_found("plan", subscription.plan_id))?;
            let price = discounted_price(plan.price_monthly, discount);
            if subscription.discount_percent == discount && subscription.individual_price == price
            {
                continue;
            }
            subscription.discount_percent = discount;
            subscription.individual_price = price;
            uow.update_subscription(&subscription).await?;
            changed += 1;
        }
    }

    if changed > 0 {
        tracing::info!(user_id, changed, "recalculated sibling discounts");
    }
    Ok(changed)
}

/// Children, orders and the user-facing subscription lifecycle.
#[derive(Clone)]
pub struct SubscriptionService {
    db: DatabaseRef,
    clock: ClockRef,
}

impl SubscriptionService {
    pub fn new(db: DatabaseRef, clock: ClockRef) -> Self {
        Self { db, clock }
    }

    pub async fn register_child(
        &self,
        user_id: UserId,
        name: &str,
        interests: BTreeSet<String>,
        skills: BTreeSet<String>,
    ) -> Result<Child> {
        if name.trim().is_empty() {
            return Err(FulfillmentError::validation("child name cannot be empty"));
        }
        let mut uow = self.db.begin().await?;
        let child = uow
            .insert_child(NewChild {
                parent_id: user_id,
                name: name.trim().to_string(),
                interests,
                skills,
                created_at: self.clock.now(),
            })
            .await?;
        recalculate_discounts_in(uow.as_mut(), user_id).await?;
        uow.commit().await?;
        tracing::info!(child_id = child.id, user_id, "registered child");
        Ok(child)
    }

    pub async fn update_child_tags(
        &self,
        user_id: UserId,
        child_id: ChildId,
        interests: BTreeSet<String>,
        skills: BTreeSet<String>,
    ) -> Result<Child> {
        let mut uow = self.db.begin().await?;
        let mut child = owned_child_in(uow.as_mut(), child_id, user_id).await?;
        child.interests = interests;
        child.skills = skills;
        uow.update_child(&child).await?;
        uow.commit().await?;
        Ok(child)
    }

    /// Soft-deletes a child and reprices the remaining siblings.
    pub async fn remove_child(&self, user_id: UserId, child_id: ChildId) -> Result<()> {
        let mut uow = self.db.begin().await?;
        let mut child = owned_child_in(uow.as_mut(), child_id, user_id).await?;
        child.is_deleted = true;
        uow.update_child(&child).await?;
        recalculate_discounts_in(uow.as_mut(), user_id).await?;
        uow.commit().await?;
        tracing::info!(child_id, user_id, "removed child");
        Ok(())
    }

    pub async fn recalculate_discounts(&self, user_id: UserId) -> Result<usize> {
        let mut uow = self.db.begin().await?;
        let changed = recalculate_discounts_in(uow.as_mut(), user_id).await?;
        uow.commit().await?;
        Ok(changed)
    }

    pub async fn add_delivery_info(
        &self,
        user_id: UserId,
        address: &str,
        preferred_date: Option<NaiveDate>,
        preferred_time: Option<String>,
    ) -> Result<DeliveryInfo> {
        let mut uow = self.db.begin().await?;
        let info = uow
            .insert_delivery_info(NewDeliveryInfo {
                user_id,
                address: address.to_string(),
                preferred_date,
                preferred_time,
            })
            .await?;
        uow.commit().await?;
        Ok(info)
    }

    /// Creates an unpaid subscription priced with the child's sibling discount.
    pub async fn order_subscription(
        &self,
        user_id: UserId,
        child_id: ChildId,
        plan_id: PlanId,
        delivery_info_id: Option<i64>,
    ) -> Result<Subscription> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let child = owned_child_in(uow.as_mut(), child_id, user_id).await?;
        let plan = uow
            .plan(plan_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("plan", plan_id))?;

        if let Some(id) = delivery_info_id {
            let info = uow
                .delivery_info(id)
                .await?
                .ok_or_else(|| FulfillmentError::not_found("delivery info", id))?;
            if info.user_id != user_id {
                return Err(FulfillmentError::validation(format!(
                    "delivery info {id} does not belong to user {user_id}"
                )));
            }
        }

        for existing in uow.subscriptions_for_child(child.id).await? {
            let status = status_in(uow.as_mut(), &existing, now).await?;
            // Expired rows renew through checkout, not a second order.
            if status != SubscriptionStatus::Cancelled {
                return Err(FulfillmentError::invalid_state(format!(
                    "child {} already has subscription {} ({status})",
                    child.id, existing.id
                )));
            }
        }

        let position = uow
            .children_of(user_id)
            .await?
            .iter()
            .position(|c| c.id == child.id)
            .unwrap_or(0);
        let discount = discount_for_position(position);

        let subscription = uow
            .insert_subscription(NewSubscription {
                child_id: child.id,
                plan_id: plan.id,
                delivery_info_id,
                discount_percent: discount,
                individual_price: discounted_price(plan.price_monthly, discount),
                created_at: now,
            })
            .await?;
        uow.commit().await?;

        tracing::info!(
            subscription_id = subscription.id,
            child_id,
            plan = %plan.name,
            price = %subscription.individual_price,
            "ordered subscription"
        );
        Ok(subscription)
    }

    pub async fn subscription(&self, subscription_id: SubscriptionId) -> Result<SubscriptionView> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let subscription = uow
            .subscription(subscription_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("subscription", subscription_id))?;
        let status = status_in(uow.as_mut(), &subscription, now).await?;
        Ok(SubscriptionView {
            subscription,
            status,
        })
    }

    pub async fn subscriptions_for_user(&self, user_id: UserId) -> Result<Vec<SubscriptionView>> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let mut views = Vec::new();
        for child in uow.children_of(user_id).await? {
            for subscription in uow.subscriptions_for_child(child.id).await? {
                let status = status_in(uow.as_mut(), &subscription, now).await?;
                views.push(SubscriptionView {
                    subscription,
                    status,
                });
            }
        }
        Ok(views)
    }

    pub async fn pause(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
    ) -> Result<SubscriptionView> {
        self.set_paused(user_id, subscription_id, true).await
    }

    pub async fn resume(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
    ) -> Result<SubscriptionView> {
        self.set_paused(user_id, subscription_id, false).await
    }

    async fn set_paused(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
        paused: bool,
    ) -> Result<SubscriptionView> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let mut subscription = uow
            .subscription(subscription_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("subscription", subscription_id))?;
        owned_child_in(uow.as_mut(), subscription.child_id, user_id).await?;

        let status = status_in(uow.as_mut(), &subscription, now).await?;
        if paused && status != SubscriptionStatus::Active {
            return Err(FulfillmentError::invalid_state(format!(
                "only active subscriptions can be paused, {subscription_id} is {status}"
            )));
        }
        if !paused && !subscription.is_paused {
            return Err(FulfillmentError::invalid_state(format!(
                "subscription {subscription_id} is not paused"
            )));
        }

        subscription.is_paused = paused;
        uow.update_subscription(&subscription).await?;
        let status = status_in(uow.as_mut(), &subscription, now).await?;
        uow.commit().await?;

        tracing::info!(subscription_id, %status, "changed pause flag");
        Ok(SubscriptionView {
            subscription,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::in_memory::InMemoryDatabase;
    use crate::infrastructure::seed::seed_demo_catalog;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn service() -> SubscriptionService {
        let db = InMemoryDatabase::new();
        seed_demo_catalog(&db).await.unwrap();
        SubscriptionService::new(Arc::new(db), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_second_child_gets_sibling_discount() {
        let service = service().await;
        let first = service
            .register_child(1, "Alice", BTreeSet::new(), BTreeSet::new())
            .await
            .unwrap();
        let second = service
            .register_child(1, "Bob", BTreeSet::new(), BTreeSet::new())
            .await
            .unwrap();

        let a = service.order_subscription(1, first.id, 1, None).await.unwrap();
        let b = service.order_subscription(1, second.id, 1, None).await.unwrap();

        assert_eq!(a.individual_price, dec!(350000));
        assert_eq!(b.discount_percent, dec!(20));
        assert_eq!(b.individual_price, dec!(280000));
    }

    #[tokio::test]
    async fn test_removing_first_child_reprices_sibling() {
        let service = service().await;
        let first = service
            .register_child(1, "Alice", BTreeSet::new(), BTreeSet::new())
            .await
            .unwrap();
        let second = service
            .register_child(1, "Bob", BTreeSet::new(), BTreeSet::new())
            .await
            .unwrap();
        let b = service.order_subscription(1, second.id, 1, None).await.unwrap();
        assert_eq!(b.discount_percent, dec!(20));

        service.remove_child(1, first.id).await.unwrap();
        let view = service.subscription(b.id).await.unwrap();
        assert_eq!(view.subscription.discount_percent, dec!(0));
        assert_eq!(view.subscription.individual_price, dec!(350000));

        // Stable: recalculating again changes nothing.
        assert_eq!(service.recalculate_discounts(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_order_requires_ownership_and_single_open_subscription() {
        let service = service().await;
        let child = service
            .register_child(1, "Alice", BTreeSet::new(), BTreeSet::new())
            .await
            .unwrap();

        assert!(matches!(
            service.order_subscription(2, child.id, 1, None).await,
            Err(FulfillmentError::ValidationError(_))
        ));
        service.order_subscription(1, child.id, 1, None).await.unwrap();
        assert!(matches!(
            service.order_subscription(1, child.id, 2, None).await,
            Err(FulfillmentError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_pause_requires_active() {
        let service = service().await;
        let child = service
            .register_child(1, "Alice", BTreeSet::new(), BTreeSet::new())
            .await
            .unwrap();
        let subscription = service.order_subscription(1, child.id, 1, None).await.unwrap();

        assert!(matches!(
            service.pause(1, subscription.id).await,
            Err(FulfillmentError::InvalidState(_))
        ));
        assert!(matches!(
            service.resume(1, subscription.id).await,
            Err(FulfillmentError::InvalidState(_))
        ));
        assert_eq!(
            service.subscription(subscription.id).await.unwrap().status,
            SubscriptionStatus::PendingPayment
        );
    }
}
