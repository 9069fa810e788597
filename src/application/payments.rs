use crate::application::ledger::{OpenPayment, PaymentLedger};
use crate::application::subscriptions::{owned_child_in, status_in};
use crate::domain::money::round_sums;
use crate::domain::payment::{Payment, PaymentId, PaymentProvider, PaymentStatus, UserId};
use crate::domain::ports::{
    ClockRef, DatabaseRef, GatewayRef, GatewayStatus, PaymentKey, PaymentRepository,
    SubscriptionRepository,
};
use crate::domain::subscription::{SubscriptionId, SubscriptionStatus};
use crate::error::{FulfillmentError, Result};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Builds the Click `merchant_trans_id` for a checkout.
///
/// `nonce` keeps two checkouts of the same subscriptions within one second
/// apart; the superseded payment still holds its id.
pub fn merchant_trans_id(
    user_id: UserId,
    subscription_ids: &[SubscriptionId],
    timestamp: i64,
    nonce: &str,
) -> String {
    let ids = subscription_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("_");
    format!("subscription_{user_id}_{ids}_{timestamp}_{nonce}")
}

fn checkout_nonce() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// The payment surface used by callers: checkout, the mock gateway flow and
/// manual refunds. Provider callbacks go through the adapters instead.
#[derive(Clone)]
pub struct PaymentEngine {
    db: DatabaseRef,
    clock: ClockRef,
    gateway: GatewayRef,
    ledger: PaymentLedger,
}

impl PaymentEngine {
    pub fn new(db: DatabaseRef, clock: ClockRef, gateway: GatewayRef, ledger: PaymentLedger) -> Self {
        Self {
            db,
            clock,
            gateway,
            ledger,
        }
    }

    /// Opens a standalone mock payment with no subscriptions attached.
    pub async fn create_payment(
        &self,
        user_id: UserId,
        amount: Decimal,
        currency: &str,
    ) -> Result<Payment> {
        let mut uow = self.db.begin().await?;
        let payment = self
            .ledger
            .open_in(
                uow.as_mut(),
                OpenPayment {
                    user_id,
                    amount: round_sums(amount),
                    currency: currency.to_string(),
                    provider: PaymentProvider::Mock,
                    external_id: self.gateway.register(amount, currency),
                    merchant_trans_id: None,
                    payme_receipt_id: None,
                    subscription_ids: Vec::new(),
                },
                self.clock.now(),
            )
            .await?;
        uow.commit().await?;
        Ok(payment)
    }

    /// Opens one payment covering `subscription_ids`.
    ///
    /// Every subscription must belong to `user_id` and be awaiting payment or
    /// expired (renewal).
    pub async fn checkout(
        &self,
        user_id: UserId,
        subscription_ids: &[SubscriptionId],
        provider: PaymentProvider,
    ) -> Result<Payment> {
        let mut ids = subscription_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Err(FulfillmentError::validation("checkout needs at least one subscription"));
        }

        let now = self.clock.now();
        let mut uow = self.db.begin().await?;

        let mut total = Decimal::ZERO;
        for id in &ids {
            let subscription = uow
                .subscription(*id)
                .await?
                .ok_or_else(|| FulfillmentError::not_found("subscription", *id))?;
            owned_child_in(uow.as_mut(), subscription.child_id, user_id).await?;
            let status = status_in(uow.as_mut(), &subscription, now).await?;
            if !matches!(
                status,
                SubscriptionStatus::PendingPayment | SubscriptionStatus::Expired
            ) {
                return Err(FulfillmentError::invalid_state(format!(
                    "subscription {id} is {status} and cannot be paid for"
                )));
            }
            total += subscription.individual_price;
        }
        let total = round_sums(total);
        let currency = self.ledger.settings().currency.clone();

        let merchant_trans_id = match provider {
            PaymentProvider::Click => Some(merchant_trans_id(
                user_id,
                &ids,
                now.timestamp(),
                &checkout_nonce(),
            )),
            PaymentProvider::Mock | PaymentProvider::Payme => None,
        };

        let payment = self
            .ledger
            .open_in(
                uow.as_mut(),
                OpenPayment {
                    user_id,
                    amount: total,
                    external_id: self.gateway.register(total, &currency),
                    currency,
                    provider,
                    merchant_trans_id,
                    payme_receipt_id: None,
                    subscription_ids: ids,
                },
                now,
            )
            .await?;
        uow.commit().await?;
        Ok(payment)
    }

    /// Runs a mock payment through the gateway.
    ///
    /// The gateway is consulted before any unit of work opens; the payment is
    /// re-read afterwards so a concurrent settlement wins cleanly.
    pub async fn process(&self, payment_id: PaymentId) -> Result<Payment> {
        let payment = self.payment(payment_id).await?;
        if payment.provider != PaymentProvider::Mock {
            return Err(FulfillmentError::validation(format!(
                "payment {payment_id} is handled by {} callbacks",
                payment.provider
            )));
        }
        if payment.status.is_terminal() {
            return Ok(payment);
        }

        let outcome = self.gateway.settle(&payment.external_id, payment.amount).await;

        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let payment = uow
            .payment(payment_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("payment", payment_id))?;
        if payment.status.is_terminal() {
            return Ok(payment);
        }

        let payment = match outcome.status {
            GatewayStatus::Succeeded => self.ledger.settle_in(uow.as_mut(), payment, now).await?.payment,
            GatewayStatus::Failed => {
                let message = outcome.message.as_deref().unwrap_or("Payment failed");
                self.ledger
                    .fail_in(uow.as_mut(), payment, None, message, now)
                    .await?
                    .0
            }
            GatewayStatus::Pending | GatewayStatus::Refunded => payment,
        };
        uow.commit().await?;
        Ok(payment)
    }

    /// Applies a status pushed by the gateway.
    ///
    /// Webhooks against a payment that already reached a terminal state are
    /// acknowledged without change, except completed to refunded.
    pub async fn handle_gateway_webhook(
        &self,
        external_id: &str,
        status: GatewayStatus,
    ) -> Result<Payment> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let payment = uow
            .find_payment(PaymentKey::External(external_id.to_string()))
            .await?
            .ok_or_else(|| FulfillmentError::not_found("payment", external_id))?;

        let payment = match (status, payment.status) {
            (GatewayStatus::Succeeded, PaymentStatus::Pending | PaymentStatus::Completed) => {
                self.ledger.settle_in(uow.as_mut(), payment, now).await?.payment
            }
            (GatewayStatus::Failed, PaymentStatus::Pending | PaymentStatus::Failed) => {
                self.ledger
                    .fail_in(uow.as_mut(), payment, None, "Payment failed (webhook)", now)
                    .await?
                    .0
            }
            (GatewayStatus::Refunded, PaymentStatus::Completed | PaymentStatus::Refunded) => {
                self.ledger
                    .refund_in(uow.as_mut(), payment, None, "Refunded (webhook)", now)
                    .await?
                    .0
            }
            (status, current) => {
                tracing::warn!(
                    external_id,
                    ?status,
                    %current,
                    "ignoring gateway webhook"
                );
                payment
            }
        };
        uow.commit().await?;
        Ok(payment)
    }

    pub async fn refund(&self, payment_id: PaymentId, reason: &str) -> Result<Payment> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let payment = uow
            .payment(payment_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("payment", payment_id))?;
        let (payment, _) = self
            .ledger
            .refund_in(uow.as_mut(), payment, None, reason, now)
            .await?;
        uow.commit().await?;
        Ok(payment)
    }

    pub async fn payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let mut uow = self.db.begin().await?;
        uow.payment(payment_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("payment", payment_id))
    }
}
