use crate::domain::catalog::CategoryId;
use crate::domain::customer::{ChildId, DeliveryInfoId};
use crate::domain::payment::UserId;
use crate::domain::subscription::SubscriptionId;
use crate::error::{FulfillmentError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type ToyBoxId = i64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToyBoxStatus {
    Planned,
    Assembled,
    Shipped,
    Delivered,
    Returned,
}

impl fmt::Display for ToyBoxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToyBoxStatus::Planned => "PLANNED",
            ToyBoxStatus::Assembled => "ASSEMBLED",
            ToyBoxStatus::Shipped => "SHIPPED",
            ToyBoxStatus::Delivered => "DELIVERED",
            ToyBoxStatus::Returned => "RETURNED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct ToyBoxItem {
    pub category_id: CategoryId,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ToyBoxReview {
    pub user_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ToyBox {
    pub id: ToyBoxId,
    pub subscription_id: SubscriptionId,
    pub child_id: ChildId,
    pub delivery_info_id: Option<DeliveryInfoId>,
    pub status: ToyBoxStatus,
    pub delivery_date: NaiveDate,
    pub delivery_time: Option<String>,
    pub return_date: NaiveDate,
    pub return_time: Option<String>,
    /// Child interests at the moment the box was composed.
    pub interest_tags: BTreeSet<String>,
    pub items: Vec<ToyBoxItem>,
    #[serde(default)]
    pub reviews: Vec<ToyBoxReview>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewToyBox {
    pub subscription_id: SubscriptionId,
    pub child_id: ChildId,
    pub delivery_info_id: Option<DeliveryInfoId>,
    pub delivery_date: NaiveDate,
    pub delivery_time: Option<String>,
    pub return_date: NaiveDate,
    pub interest_tags: BTreeSet<String>,
    pub items: Vec<ToyBoxItem>,
    pub created_at: DateTime<Utc>,
}

impl NewToyBox {
    pub fn into_toy_box(self, id: ToyBoxId) -> ToyBox {
        ToyBox {
            id,
            subscription_id: self.subscription_id,
            child_id: self.child_id,
            delivery_info_id: self.delivery_info_id,
            status: ToyBoxStatus::Planned,
            delivery_date: self.delivery_date,
            delivery_time: self.delivery_time,
            return_date: self.return_date,
            return_time: None,
            interest_tags: self.interest_tags,
            items: self.items,
            reviews: Vec::new(),
            created_at: self.created_at,
        }
    }
}

impl ToyBox {
    /// Moves the box forward. Skipping steps is allowed, going back is not.
    pub fn advance(&mut self, next: ToyBoxStatus) -> Result<()> {
        if next <= self.status {
            return Err(FulfillmentError::invalid_state(format!(
                "toy box {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn total_items(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn contains_category(&self, category_id: CategoryId) -> bool {
        self.items.iter().any(|item| item.category_id == category_id)
    }

    pub fn add_review(&mut self, review: ToyBoxReview) -> Result<()> {
        if self.status != ToyBoxStatus::Delivered {
            return Err(FulfillmentError::invalid_state(format!(
                "toy box {} can only be reviewed once delivered (status {})",
                self.id, self.status
            )));
        }
        if !(1..=5).contains(&review.rating) {
            return Err(FulfillmentError::validation(format!(
                "rating must be between 1 and 5, got {}",
                review.rating
            )));
        }
        if self.reviews.iter().any(|r| r.user_id == review.user_id) {
            return Err(FulfillmentError::Conflict(format!(
                "user {} already reviewed toy box {}",
                review.user_id, self.id
            )));
        }
        self.reviews.push(review);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PreviewItem {
    pub category_id: CategoryId,
    pub name: String,
    pub icon: String,
    pub quantity: u32,
}

/// Unpersisted projection of what the next box would contain.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct NextBoxPreview {
    pub child_id: ChildId,
    pub items: Vec<PreviewItem>,
    pub delivery_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned() -> ToyBox {
        let today = Utc::now().date_naive();
        NewToyBox {
            subscription_id: 1,
            child_id: 1,
            delivery_info_id: None,
            delivery_date: today,
            delivery_time: None,
            return_date: today,
            interest_tags: BTreeSet::new(),
            items: vec![
                ToyBoxItem {
                    category_id: 1,
                    quantity: 3,
                },
                ToyBoxItem {
                    category_id: 2,
                    quantity: 1,
                },
            ],
            created_at: Utc::now(),
        }
        .into_toy_box(1)
    }

    #[test]
    fn test_status_is_forward_only() {
        let mut toy_box = planned();
        toy_box.advance(ToyBoxStatus::Assembled).unwrap();
        toy_box.advance(ToyBoxStatus::Delivered).unwrap();
        assert!(toy_box.advance(ToyBoxStatus::Shipped).is_err());
        assert!(toy_box.advance(ToyBoxStatus::Delivered).is_err());
        toy_box.advance(ToyBoxStatus::Returned).unwrap();
        assert_eq!(toy_box.status, ToyBoxStatus::Returned);
    }

    #[test]
    fn test_items_helpers() {
        let toy_box = planned();
        assert_eq!(toy_box.total_items(), 4);
        assert!(toy_box.contains_category(2));
        assert!(!toy_box.contains_category(3));
    }

    #[test]
    fn test_review_rules() {
        let review = |user_id, rating| ToyBoxReview {
            user_id,
            rating,
            comment: None,
            created_at: Utc::now(),
        };

        let mut toy_box = planned();
        assert!(matches!(
            toy_box.add_review(review(1, 5)),
            Err(FulfillmentError::InvalidState(_))
        ));

        toy_box.advance(ToyBoxStatus::Delivered).unwrap();
        assert!(matches!(
            toy_box.add_review(review(1, 6)),
            Err(FulfillmentError::ValidationError(_))
        ));
        toy_box.add_review(review(1, 4)).unwrap();
        assert!(matches!(
            toy_box.add_review(review(1, 5)),
            Err(FulfillmentError::Conflict(_))
        ));
        assert_eq!(toy_box.reviews.len(), 1);
    }
}
