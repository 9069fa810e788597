use crate::domain::catalog::{Category, Inventory};
use crate::domain::ports::{CatalogRepository, Database, UnitOfWork};
use crate::domain::subscription::SubscriptionPlan;
use crate::error::Result;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

fn tags(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Demo plans: `(name, monthly price, toys per box)`.
const PLANS: [(&str, rust_decimal::Decimal, u32); 2] =
    [("Базовый", dec!(350000), 6), ("Премиум", dec!(600000), 9)];

/// Demo categories: `(name, icon, interests, skills, stock)`.
#[allow(clippy::type_complexity)]
const CATEGORIES: [(&str, &str, &[&str], &[&str], u32); 5] = [
    (
        "Конструктор",
        "🧩",
        &["Конструкторы", "Техника"],
        &["Моторика", "Логика"],
        20,
    ),
    (
        "Творческий набор",
        "🎨",
        &["Творчество"],
        &["Творчество", "Воображение"],
        12,
    ),
    (
        "Мягкая игрушка",
        "🧸",
        &["Плюшевые", "Ролевые"],
        &["Воображение", "Речь"],
        3,
    ),
    ("Головоломка", "🧠", &["Развивающие"], &["Логика"], 10),
    (
        "Премиум-игрушка",
        "⭐",
        &["Развивающие", "Техника"],
        &["Логика", "Моторика"],
        5,
    ),
];

/// Loads the demo plans, categories and stock unless a catalog already exists.
///
/// Returns whether anything was written.
pub async fn seed_demo_catalog(db: &dyn Database) -> Result<bool> {
    let mut uow = db.begin().await?;
    if !uow.categories().await?.is_empty() {
        tracing::debug!("catalog already present, skipping seed");
        return Ok(false);
    }

    for (id, (name, price_monthly, toy_count)) in (1..).zip(PLANS) {
        uow.upsert_plan(SubscriptionPlan {
            id,
            name: name.to_string(),
            price_monthly,
            toy_count,
        })
        .await?;
    }

    for (id, (name, icon, interests, skills, stock)) in (1..).zip(CATEGORIES) {
        uow.upsert_category(Category {
            id,
            name: name.to_string(),
            icon: icon.to_string(),
            interests: tags(interests),
            skills: tags(skills),
        })
        .await?;
        uow.update_inventory(Inventory::new(id, stock)).await?;
    }

    uow.commit().await?;
    tracing::info!(
        plans = PLANS.len(),
        categories = CATEGORIES.len(),
        "seeded demo catalog"
    );
    Ok(true)
}
