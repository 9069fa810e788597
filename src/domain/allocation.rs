use crate::domain::catalog::{CategoryId, inventory_cap};
use crate::domain::scoring::RankedCategory;
use crate::domain::toy_box::ToyBoxItem;
use std::collections::{HashMap, HashSet};

/// Distinct categories the scored pass may use in one box.
pub const MAX_DISTINCT_CATEGORIES: usize = 6;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllocationPlan {
    pub items: Vec<ToyBoxItem>,
    /// Units of `toy_count` nothing could be found for.
    pub shortfall: u32,
}

impl AllocationPlan {
    pub fn total(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

/// Greedy two-pass composition of a box.
///
/// The scored pass walks `ranked` (categories with a positive score only),
/// taking up to each category's cap, and stops after
/// [`MAX_DISTINCT_CATEGORIES`]. The fallback pass fills what is left from the
/// unused categories in `catalog_order`, with recently shipped ones last.
/// A box that cannot be filled keeps its partial content.
pub fn allocate(
    toy_count: u32,
    ranked: &[RankedCategory],
    catalog_order: &[CategoryId],
    available: &HashMap<CategoryId, u32>,
    recent: &HashSet<CategoryId>,
) -> AllocationPlan {
    let mut plan = AllocationPlan::default();
    let mut need = toy_count;

    let take = |category_id: CategoryId, need: &mut u32, plan: &mut AllocationPlan| {
        let stock = available.get(&category_id).copied().unwrap_or(0);
        let quantity = (*need).min(inventory_cap(stock)).min(stock);
        if quantity == 0 {
            return;
        }
        tracing::debug!(category_id, stock, quantity, "allocated category");
        plan.items.push(ToyBoxItem {
            category_id,
            quantity,
        });
        *need -= quantity;
    };

    for candidate in ranked.iter().filter(|c| c.score > 0.0) {
        if need == 0 || plan.items.len() >= MAX_DISTINCT_CATEGORIES {
            break;
        }
        take(candidate.category_id, &mut need, &mut plan);
    }

    if need > 0 {
        let scored: HashSet<CategoryId> = plan.items.iter().map(|i| i.category_id).collect();
        let (fresh, stale): (Vec<CategoryId>, Vec<CategoryId>) = catalog_order
            .iter()
            .copied()
            .filter(|id| !scored.contains(id))
            .partition(|id| !recent.contains(id));

        for category_id in fresh.into_iter().chain(stale) {
            if need == 0 {
                break;
            }
            take(category_id, &mut need, &mut plan);
        }
    }

    plan.shortfall = need;
    plan
}
