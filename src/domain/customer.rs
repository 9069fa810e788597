use crate::domain::payment::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type ChildId = i64;
pub type DeliveryInfoId = i64;

/// A child profile. Interests and skills are tag names matched against
/// category tags when composing a box.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Child {
    pub id: ChildId,
    pub parent_id: UserId,
    pub name: String,
    pub interests: BTreeSet<String>,
    pub skills: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChild {
    pub parent_id: UserId,
    pub name: String,
    pub interests: BTreeSet<String>,
    pub skills: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl NewChild {
    pub fn into_child(self, id: ChildId) -> Child {
        Child {
            id,
            parent_id: self.parent_id,
            name: self.name,
            interests: self.interests,
            skills: self.skills,
            created_at: self.created_at,
            is_deleted: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct DeliveryInfo {
    pub id: DeliveryInfoId,
    pub user_id: UserId,
    pub address: String,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryInfo {
    pub user_id: UserId,
    pub address: String,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time: Option<String>,
}

impl NewDeliveryInfo {
    pub fn into_delivery_info(self, id: DeliveryInfoId) -> DeliveryInfo {
        DeliveryInfo {
            id,
            user_id: self.user_id,
            address: self.address,
            preferred_date: self.preferred_date,
            preferred_time: self.preferred_time,
        }
    }
}
