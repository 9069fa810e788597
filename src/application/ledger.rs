use crate::application::allocator::create_box_in;
use crate::application::subscriptions::status_in;
use crate::config::Settings;
use crate::domain::payment::{
    NewPayment, Payment, PaymentProvider, PaymentStatus, Transition, UserId,
};
use crate::domain::ports::{PaymentRepository, SubscriptionRepository, UnitOfWork};
use crate::domain::subscription::{SubscriptionId, SubscriptionStatus};
use crate::domain::toy_box::ToyBox;
use crate::error::{FulfillmentError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Everything needed to open a payment for a set of subscriptions.
#[derive(Debug, Clone)]
pub struct OpenPayment {
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub provider: PaymentProvider,
    pub external_id: String,
    pub merchant_trans_id: Option<String>,
    pub payme_receipt_id: Option<String>,
    pub subscription_ids: Vec<SubscriptionId>,
}

/// Result of settling a payment.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub payment: Payment,
    pub transition: Transition,
    /// Boxes created by this settlement. Empty on a replay.
    pub boxes: Vec<ToyBox>,
}

/// Provider-agnostic payment transitions and their side effects.
///
/// Every operation works inside a unit of work owned by the caller, so a
/// provider callback commits its payment change and the resulting boxes
/// together or not at all.
#[derive(Clone)]
pub struct PaymentLedger {
    settings: Arc<Settings>,
}

impl PaymentLedger {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Inserts a PENDING payment and links `subscription_ids` to it.
    ///
    /// Any pending payment those subscriptions already point at is expired and
    /// unlinked first.
    pub async fn open_in(
        &self,
        uow: &mut dyn UnitOfWork,
        request: OpenPayment,
        now: DateTime<Utc>,
    ) -> Result<Payment> {
        let amount = self.settings.amount_bounds().validate(request.amount)?;

        let mut subscriptions = Vec::with_capacity(request.subscription_ids.len());
        for id in &request.subscription_ids {
            let subscription = uow
                .subscription(*id)
                .await?
                .ok_or_else(|| FulfillmentError::not_found("subscription", *id))?;
            if let Some(previous) = subscription.payment_id {
                self.supersede_in(uow, previous, now).await?;
            }
            subscriptions.push(subscription);
        }

        let payment = uow
            .insert_payment(NewPayment {
                user_id: request.user_id,
                amount,
                currency: request.currency,
                provider: request.provider,
                external_id: request.external_id,
                merchant_trans_id: request.merchant_trans_id,
                payme_receipt_id: request.payme_receipt_id,
                created_at: now,
            })
            .await?;

        for mut subscription in subscriptions {
            subscription.payment_id = Some(payment.id);
            uow.update_subscription(&subscription).await?;
        }

        tracing::info!(
            payment_id = payment.id,
            provider = %payment.provider,
            amount = %payment.amount,
            subscriptions = ?request.subscription_ids,
            "opened payment"
        );
        Ok(payment)
    }

    async fn supersede_in(
        &self,
        uow: &mut dyn UnitOfWork,
        payment_id: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(mut previous) = uow.payment(payment_id).await? else {
            return Ok(());
        };
        if previous.status != PaymentStatus::Pending {
            return Ok(());
        }

        for mut linked in uow.subscriptions_for_payment(previous.id).await? {
            linked.payment_id = None;
            uow.update_subscription(&linked).await?;
        }
        previous.expire(now)?;
        uow.update_payment(&previous).await?;
        tracing::info!(payment_id = previous.id, "superseded pending payment");
        Ok(())
    }

    /// Completes a payment, renews its subscriptions and plans one box each.
    ///
    /// A replay against an already completed payment changes nothing.
    pub async fn settle_in(
        &self,
        uow: &mut dyn UnitOfWork,
        mut payment: Payment,
        now: DateTime<Utc>,
    ) -> Result<Settlement> {
        let transition = payment.complete(now)?;
        if transition == Transition::AlreadyApplied {
            tracing::debug!(payment_id = payment.id, "payment already completed");
            return Ok(Settlement {
                payment,
                transition,
                boxes: Vec::new(),
            });
        }
        uow.update_payment(&payment).await?;

        let period = Duration::days(self.settings.subscription_period_days);
        let mut renewed = Vec::new();
        for mut subscription in uow.subscriptions_for_payment(payment.id).await? {
            let base = subscription.expires_at.map_or(now, |expires| expires.max(now));
            subscription.expires_at = Some(base + period);
            uow.update_subscription(&subscription).await?;
            renewed.push(subscription);
        }

        let mut boxes = Vec::with_capacity(renewed.len());
        for subscription in &renewed {
            if status_in(uow, subscription, now).await? == SubscriptionStatus::Paused {
                tracing::warn!(
                    subscription_id = subscription.id,
                    "subscription is paused, no box planned"
                );
                continue;
            }
            boxes.push(create_box_in(uow, &self.settings, subscription.id, now).await?);
        }

        tracing::info!(
            payment_id = payment.id,
            subscriptions = renewed.len(),
            boxes = boxes.len(),
            "payment completed"
        );
        Ok(Settlement {
            payment,
            transition,
            boxes,
        })
    }

    pub async fn fail_in(
        &self,
        uow: &mut dyn UnitOfWork,
        mut payment: Payment,
        code: Option<i32>,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<(Payment, Transition)> {
        let transition = payment.fail(code, message, now)?;
        if transition == Transition::Applied {
            uow.update_payment(&payment).await?;
            tracing::info!(payment_id = payment.id, ?code, message, "payment failed");
        }
        Ok((payment, transition))
    }

    /// Provider cancellation: pending fails, completed is refunded.
    pub async fn cancel_in(
        &self,
        uow: &mut dyn UnitOfWork,
        mut payment: Payment,
        reason: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<(Payment, Transition)> {
        let transition = payment.cancel(reason, now)?;
        if transition == Transition::Applied {
            uow.update_payment(&payment).await?;
            tracing::info!(
                payment_id = payment.id,
                ?reason,
                status = %payment.status,
                "payment cancelled"
            );
        }
        Ok((payment, transition))
    }

    /// Refunds a completed payment. Boxes already planned are kept.
    pub async fn refund_in(
        &self,
        uow: &mut dyn UnitOfWork,
        mut payment: Payment,
        reason: Option<i32>,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<(Payment, Transition)> {
        let transition = payment.refund(reason, message, now)?;
        if transition == Transition::Applied {
            uow.update_payment(&payment).await?;
            tracing::info!(payment_id = payment.id, message, "payment refunded");
        }
        Ok((payment, transition))
    }
}
