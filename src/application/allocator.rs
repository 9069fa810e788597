use crate::application::inventory::InventoryLedger;
use crate::application::subscriptions::{owned_child_in, status_in};
use crate::config::Settings;
use crate::domain::allocation::{AllocationPlan, allocate};
use crate::domain::catalog::CategoryId;
use crate::domain::customer::{Child, ChildId};
use crate::domain::payment::UserId;
use crate::domain::ports::{
    CatalogRepository, ClockRef, CustomerRepository, DatabaseRef, SubscriptionRepository,
    ToyBoxRepository, UnitOfWork,
};
use crate::domain::scoring::{RECENT_BOX_WINDOW, rank_categories};
use crate::domain::subscription::{SubscriptionId, SubscriptionStatus};
use crate::domain::toy_box::{
    NewToyBox, NextBoxPreview, PreviewItem, ToyBox, ToyBoxId, ToyBoxReview, ToyBoxStatus,
};
use crate::error::{FulfillmentError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Works out box content for `child` against current stock.
async fn compose_in(
    uow: &mut dyn UnitOfWork,
    child: &Child,
    toy_count: u32,
) -> Result<AllocationPlan> {
    let categories = uow.categories().await?;
    let available: HashMap<CategoryId, u32> = uow
        .inventories()
        .await?
        .into_iter()
        .map(|inventory| (inventory.category_id, inventory.available_quantity))
        .collect();

    let recent: HashSet<CategoryId> = uow
        .boxes_for_child(child.id)
        .await?
        .iter()
        .take(RECENT_BOX_WINDOW)
        .flat_map(|toy_box| toy_box.items.iter().map(|item| item.category_id))
        .collect();

    let ranked = rank_categories(&child.interests, &child.skills, &categories, &recent);
    let catalog_order: Vec<CategoryId> = categories.iter().map(|c| c.id).collect();
    Ok(allocate(toy_count, &ranked, &catalog_order, &available, &recent))
}

/// Creates a PLANNED box for an active subscription and reserves its items.
///
/// Runs inside the caller's unit of work so payment settlement and box
/// creation commit together.
pub async fn create_box_in(
    uow: &mut dyn UnitOfWork,
    settings: &Settings,
    subscription_id: SubscriptionId,
    now: DateTime<Utc>,
) -> Result<ToyBox> {
    let subscription = uow
        .subscription(subscription_id)
        .await?
        .ok_or_else(|| FulfillmentError::not_found("subscription", subscription_id))?;

    let status = status_in(uow, &subscription, now).await?;
    if status != SubscriptionStatus::Active {
        return Err(FulfillmentError::invalid_state(format!(
            "subscription {subscription_id} is {status}, boxes need an active subscription"
        )));
    }

    let child = uow
        .child(subscription.child_id)
        .await?
        .ok_or_else(|| FulfillmentError::not_found("child", subscription.child_id))?;
    let plan = uow
        .plan(subscription.plan_id)
        .await?
        .ok_or_else(|| FulfillmentError::not_found("plan", subscription.plan_id))?;

    let allocation = compose_in(uow, &child, plan.toy_count).await?;
    if allocation.shortfall > 0 {
        tracing::warn!(
            subscription_id,
            toy_count = plan.toy_count,
            shortfall = allocation.shortfall,
            "not enough stock for a full box"
        );
    }
    for item in &allocation.items {
        InventoryLedger::reserve_in(uow, item.category_id, item.quantity).await?;
    }

    let today = now.date_naive();
    let delivery_info = match subscription.delivery_info_id {
        Some(id) => uow.delivery_info(id).await?,
        None => None,
    };
    let delivery_date = delivery_info
        .as_ref()
        .and_then(|info| info.preferred_date)
        .filter(|date| *date >= today)
        .unwrap_or(today + Duration::days(settings.initial_delivery_days));
    let delivery_time = delivery_info.and_then(|info| info.preferred_time);

    let toy_box = uow
        .insert_toy_box(NewToyBox {
            subscription_id,
            child_id: child.id,
            delivery_info_id: subscription.delivery_info_id,
            delivery_date,
            delivery_time,
            return_date: delivery_date + Duration::days(settings.rental_days),
            interest_tags: child.interests.clone(),
            items: allocation.items,
            created_at: now,
        })
        .await?;

    tracing::info!(
        box_id = toy_box.id,
        subscription_id,
        child_id = child.id,
        items = toy_box.total_items(),
        %delivery_date,
        "planned toy box"
    );
    Ok(toy_box)
}

/// Box composition, scheduling and lifecycle.
#[derive(Clone)]
pub struct ToyBoxAllocator {
    db: DatabaseRef,
    clock: ClockRef,
    settings: Arc<Settings>,
}

impl ToyBoxAllocator {
    pub fn new(db: DatabaseRef, clock: ClockRef, settings: Arc<Settings>) -> Self {
        Self {
            db,
            clock,
            settings,
        }
    }

    pub async fn create_box_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<ToyBox> {
        let mut uow = self.db.begin().await?;
        let toy_box =
            create_box_in(uow.as_mut(), &self.settings, subscription_id, self.clock.now()).await?;
        uow.commit().await?;
        Ok(toy_box)
    }

    /// What the child's next box would hold right now. Nothing is reserved.
    pub async fn next_box_preview(&self, child_id: ChildId) -> Result<NextBoxPreview> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let child = uow
            .child(child_id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| FulfillmentError::not_found("child", child_id))?;

        let mut subscription = None;
        for candidate in uow.subscriptions_for_child(child_id).await?.into_iter().rev() {
            let status = status_in(uow.as_mut(), &candidate, now).await?;
            if status != SubscriptionStatus::Cancelled {
                subscription = Some(candidate);
                break;
            }
        }
        let subscription =
            subscription.ok_or_else(|| FulfillmentError::not_found("subscription for child", child_id))?;
        let plan = uow
            .plan(subscription.plan_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("plan", subscription.plan_id))?;

        let allocation = compose_in(uow.as_mut(), &child, plan.toy_count).await?;
        let categories: HashMap<CategoryId, _> = uow
            .categories()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let items = allocation
            .items
            .iter()
            .map(|item| {
                let category = categories.get(&item.category_id);
                PreviewItem {
                    category_id: item.category_id,
                    name: category.map(|c| c.name.clone()).unwrap_or_default(),
                    icon: category.map(|c| c.icon.clone()).unwrap_or_default(),
                    quantity: item.quantity,
                }
            })
            .collect();

        let current = uow.boxes_for_child(child_id).await?.into_iter().next();
        let (delivery_date, return_date) = match current {
            Some(current) => {
                let delivery =
                    current.return_date + Duration::days(self.settings.next_delivery_gap_days);
                (
                    Some(delivery),
                    Some(delivery + Duration::days(self.settings.rental_days)),
                )
            }
            None => (None, None),
        };

        Ok(NextBoxPreview {
            child_id,
            items,
            delivery_date,
            return_date,
        })
    }

    /// Most recently created box of a child.
    pub async fn current_box(&self, child_id: ChildId) -> Result<Option<ToyBox>> {
        let mut uow = self.db.begin().await?;
        Ok(uow.boxes_for_child(child_id).await?.into_iter().next())
    }

    pub async fn box_history(&self, child_id: ChildId, limit: usize) -> Result<Vec<ToyBox>> {
        let mut uow = self.db.begin().await?;
        Ok(uow
            .boxes_for_child(child_id)
            .await?
            .into_iter()
            .take(limit)
            .collect())
    }

    /// Moves a box forward. A returned box gives its items back to stock.
    pub async fn advance_box(&self, box_id: ToyBoxId, status: ToyBoxStatus) -> Result<ToyBox> {
        let mut uow = self.db.begin().await?;
        let mut toy_box = uow
            .toy_box(box_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("toy box", box_id))?;
        toy_box.advance(status)?;

        if status == ToyBoxStatus::Returned {
            for item in &toy_box.items {
                InventoryLedger::release_in(uow.as_mut(), item.category_id, item.quantity).await?;
            }
        }

        uow.update_toy_box(&toy_box).await?;
        uow.commit().await?;
        tracing::info!(box_id, %status, "advanced toy box");
        Ok(toy_box)
    }

    pub async fn add_review(
        &self,
        box_id: ToyBoxId,
        user_id: UserId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<ToyBox> {
        let mut uow = self.db.begin().await?;
        let mut toy_box = uow
            .toy_box(box_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("toy box", box_id))?;
        owned_child_in(uow.as_mut(), toy_box.child_id, user_id).await?;

        toy_box.add_review(ToyBoxReview {
            user_id,
            rating,
            comment,
            created_at: self.clock.now(),
        })?;
        uow.update_toy_box(&toy_box).await?;
        uow.commit().await?;
        Ok(toy_box)
    }
}
