use crate::domain::customer::ChildId;
use crate::domain::money::round_sums;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SubscriptionId = i64;
pub type PlanId = i64;

/// Discount granted to every child after the first one.
pub const SIBLING_DISCOUNT_PERCENT: Decimal = dec!(20);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    PendingPayment,
    Active,
    Paused,
    Expired,
    Cancelled,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionStatus::PendingPayment => "PENDING_PAYMENT",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Paused => "PAUSED",
            SubscriptionStatus::Expired => "EXPIRED",
            SubscriptionStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Computes a subscription's status from the rows it depends on.
///
/// This is the only place status is decided. Nothing stores the result.
pub fn derive_status(
    is_paused: bool,
    payment_status: Option<PaymentStatus>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SubscriptionStatus {
    if is_paused {
        return SubscriptionStatus::Paused;
    }
    match payment_status {
        None
        | Some(PaymentStatus::Pending)
        | Some(PaymentStatus::Failed)
        | Some(PaymentStatus::Expired) => SubscriptionStatus::PendingPayment,
        Some(PaymentStatus::Refunded) => SubscriptionStatus::Cancelled,
        Some(PaymentStatus::Completed) => match expires_at {
            Some(expires_at) if expires_at <= now => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::Active,
        },
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SubscriptionPlan {
    pub id: PlanId,
    pub name: String,
    pub price_monthly: Decimal,
    pub toy_count: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub child_id: ChildId,
    pub plan_id: PlanId,
    pub delivery_info_id: Option<i64>,
    pub payment_id: Option<PaymentId>,
    pub discount_percent: Decimal,
    pub individual_price: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub child_id: ChildId,
    pub plan_id: PlanId,
    pub delivery_info_id: Option<i64>,
    pub discount_percent: Decimal,
    pub individual_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl NewSubscription {
    pub fn into_subscription(self, id: SubscriptionId) -> Subscription {
        Subscription {
            id,
            child_id: self.child_id,
            plan_id: self.plan_id,
            delivery_info_id: self.delivery_info_id,
            payment_id: None,
            discount_percent: self.discount_percent,
            individual_price: self.individual_price,
            expires_at: None,
            is_paused: false,
            created_at: self.created_at,
        }
    }
}

impl Subscription {
    /// Derived status given the payment row this subscription points at.
    ///
    /// A payment whose id differs from `payment_id` is treated as absent.
    pub fn status(&self, payment: Option<&Payment>, now: DateTime<Utc>) -> SubscriptionStatus {
        let payment_status = match (self.payment_id, payment) {
            (Some(linked), Some(payment)) if payment.id == linked => Some(payment.status),
            _ => None,
        };
        derive_status(self.is_paused, payment_status, self.expires_at, now)
    }

    /// Whether the price may still be changed without touching an amount a
    /// provider is settling or has settled.
    pub fn is_repriceable(&self, payment: Option<&Payment>) -> bool {
        match (self.payment_id, payment) {
            (None, _) => true,
            (Some(linked), Some(payment)) if payment.id == linked => matches!(
                payment.status,
                PaymentStatus::Failed | PaymentStatus::Expired
            ),
            (Some(_), _) => false,
        }
    }
}

/// Discount for the child at `position` in creation order (0-based).
pub fn discount_for_position(position: usize) -> Decimal {
    if position == 0 {
        Decimal::ZERO
    } else {
        SIBLING_DISCOUNT_PERCENT
    }
}

pub fn discounted_price(price: Decimal, discount_percent: Decimal) -> Decimal {
    round_sums(price * (Decimal::ONE_HUNDRED - discount_percent) / Decimal::ONE_HUNDRED)
}
