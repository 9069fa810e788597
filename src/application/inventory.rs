use crate::domain::catalog::{CategoryId, Inventory};
use crate::domain::ports::{
    CatalogRepository, DatabaseRef, ToyBoxRepository, UnitOfWork,
};
use crate::domain::toy_box::ToyBoxStatus;
use crate::error::{FulfillmentError, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Per-category stock figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub category_id: CategoryId,
    pub name: String,
    pub available: u32,
    /// Units sitting in PLANNED boxes.
    pub reserved: u32,
    /// Units off the shelf outside PLANNED boxes: boxes on their way or at
    /// the customer, plus manual holds.
    pub out: u32,
}

/// Stock reservations against the catalog inventory.
///
/// `available_quantity` is debited when a box reserves items and credited
/// when the box comes back. No reserved counter is stored; it is computed
/// from PLANNED boxes on demand.
#[derive(Clone)]
pub struct InventoryLedger {
    db: DatabaseRef,
}

impl InventoryLedger {
    pub fn new(db: DatabaseRef) -> Self {
        Self { db }
    }

    /// Debits `quantity` units inside an open unit of work.
    pub async fn reserve_in(
        uow: &mut dyn UnitOfWork,
        category_id: CategoryId,
        quantity: u32,
    ) -> Result<Inventory> {
        let mut inventory = uow
            .inventory(category_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("inventory", category_id))?;
        inventory.reserve(quantity)?;
        uow.update_inventory(inventory).await?;
        tracing::debug!(
            category_id,
            quantity,
            available = inventory.available_quantity,
            "reserved stock"
        );
        Ok(inventory)
    }

    /// Credits `quantity` units back inside an open unit of work.
    pub async fn release_in(
        uow: &mut dyn UnitOfWork,
        category_id: CategoryId,
        quantity: u32,
    ) -> Result<Inventory> {
        let mut inventory = uow
            .inventory(category_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("inventory", category_id))?;
        inventory.release(quantity)?;
        uow.update_inventory(inventory).await?;
        tracing::debug!(
            category_id,
            quantity,
            available = inventory.available_quantity,
            "released stock"
        );
        Ok(inventory)
    }

    /// Manual stock hold outside any box, e.g. damaged or lost units.
    ///
    /// The units show up in [`StockLevel::out`], not in `reserved`.
    pub async fn reserve(&self, category_id: CategoryId, quantity: u32) -> Result<Inventory> {
        let mut uow = self.db.begin().await?;
        let inventory = Self::reserve_in(uow.as_mut(), category_id, quantity).await?;
        uow.commit().await?;
        Ok(inventory)
    }

    /// Returns manually held units to the shelf. Fails rather than credit
    /// more than is out.
    pub async fn release(&self, category_id: CategoryId, quantity: u32) -> Result<Inventory> {
        let mut uow = self.db.begin().await?;
        let inventory = Self::release_in(uow.as_mut(), category_id, quantity).await?;
        uow.commit().await?;
        Ok(inventory)
    }

    pub async fn stock_report(&self) -> Result<Vec<StockLevel>> {
        let mut uow = self.db.begin().await?;

        let mut reserved: HashMap<CategoryId, u32> = HashMap::new();
        for toy_box in uow.all_toy_boxes().await? {
            if toy_box.status != ToyBoxStatus::Planned {
                continue;
            }
            for item in &toy_box.items {
                *reserved.entry(item.category_id).or_default() += item.quantity;
            }
        }

        let names: HashMap<CategoryId, String> = uow
            .categories()
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        Ok(uow
            .inventories()
            .await?
            .into_iter()
            .map(|inventory| {
                let planned = reserved.get(&inventory.category_id).copied().unwrap_or(0);
                StockLevel {
                    category_id: inventory.category_id,
                    name: names
                        .get(&inventory.category_id)
                        .cloned()
                        .unwrap_or_default(),
                    available: inventory.available_quantity,
                    reserved: planned,
                    out: inventory.out_quantity().saturating_sub(planned),
                }
            })
            .collect())
    }
}
