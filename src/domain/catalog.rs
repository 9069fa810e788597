use crate::error::{FulfillmentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type CategoryId = i64;

/// Catalog metadata for one toy category.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub icon: String,
    pub interests: BTreeSet<String>,
    pub skills: BTreeSet<String>,
}

/// Stock on the shelf for one category.
///
/// Units sitting in PLANNED boxes are already debited from
/// `available_quantity`; the reserved figure is derived from those boxes.
/// `total_quantity` is every unit the business owns, so `available_quantity`
/// never exceeds it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct Inventory {
    pub category_id: CategoryId,
    pub available_quantity: u32,
    pub total_quantity: u32,
}

impl Inventory {
    /// A fully stocked category: nothing is out.
    pub fn new(category_id: CategoryId, total_quantity: u32) -> Self {
        Self {
            category_id,
            available_quantity: total_quantity,
            total_quantity,
        }
    }

    /// Units debited and not yet credited back.
    pub fn out_quantity(&self) -> u32 {
        self.total_quantity.saturating_sub(self.available_quantity)
    }

    pub fn reserve(&mut self, quantity: u32) -> Result<()> {
        if self.available_quantity < quantity {
            return Err(FulfillmentError::InsufficientStock {
                category_id: self.category_id,
                requested: quantity,
                available: self.available_quantity,
            });
        }
        self.available_quantity -= quantity;
        Ok(())
    }

    /// Credits `quantity` units back. Only units that are out can return.
    pub fn release(&mut self, quantity: u32) -> Result<()> {
        if quantity > self.out_quantity() {
            return Err(FulfillmentError::validation(format!(
                "cannot return {quantity} units of category {}: only {} are out",
                self.category_id,
                self.out_quantity()
            )));
        }
        self.available_quantity += quantity;
        Ok(())
    }

    pub fn cap(&self) -> u32 {
        inventory_cap(self.available_quantity)
    }
}

/// Most units of one category a single box may take, tiered by stock level.
pub fn inventory_cap(available: u32) -> u32 {
    match available {
        0..=5 => 1,
        6..=15 => 2,
        _ => 3,
    }
}
