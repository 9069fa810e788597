use crate::error::{FulfillmentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type PaymentId = i64;
pub type UserId = i64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Expired,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Expired => "expired",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Mock,
    Click,
    Payme,
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentProvider::Mock => "mock",
            PaymentProvider::Click => "click",
            PaymentProvider::Payme => "payme",
        };
        f.write_str(name)
    }
}

/// Outcome of asking a payment to move to a state.
///
/// `AlreadyApplied` means the payment was already in the requested state, so
/// the caller must ack without repeating any side effect.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Transition {
    Applied,
    AlreadyApplied,
}

/// A provider-agnostic ledger entry.
///
/// Amounts are kept in major units. The correlation ids are unique across all
/// payments and double as idempotency keys for provider callbacks.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider: PaymentProvider,
    /// Id assigned by the (mock) gateway when the payment was opened.
    pub external_id: String,
    pub merchant_trans_id: Option<String>,
    pub click_trans_id: Option<i64>,
    pub merchant_prepare_id: Option<i64>,
    pub payme_receipt_id: Option<String>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
    pub cancel_reason: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub performed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Row data for a payment that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub provider: PaymentProvider,
    pub external_id: String,
    pub merchant_trans_id: Option<String>,
    pub payme_receipt_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewPayment {
    pub fn into_payment(self, id: PaymentId) -> Payment {
        Payment {
            id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            status: PaymentStatus::Pending,
            provider: self.provider,
            external_id: self.external_id,
            merchant_trans_id: self.merchant_trans_id,
            click_trans_id: None,
            merchant_prepare_id: None,
            payme_receipt_id: self.payme_receipt_id,
            error_code: None,
            error_message: None,
            cancel_reason: None,
            created_at: self.created_at,
            performed_at: None,
            cancelled_at: None,
        }
    }
}

impl Payment {
    fn illegal(&self, target: PaymentStatus) -> FulfillmentError {
        FulfillmentError::invalid_state(format!(
            "payment {} cannot move from {} to {}",
            self.id, self.status, target
        ))
    }

    /// Marks the payment as paid.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<Transition> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Completed;
                self.error_code = Some(0);
                self.performed_at = Some(now);
                Ok(Transition::Applied)
            }
            PaymentStatus::Completed => Ok(Transition::AlreadyApplied),
            _ => Err(self.illegal(PaymentStatus::Completed)),
        }
    }

    /// Records a provider-reported failure.
    pub fn fail(
        &mut self,
        code: Option<i32>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Failed;
                self.error_code = code;
                self.error_message = Some(message.into());
                self.cancelled_at = Some(now);
                Ok(Transition::Applied)
            }
            PaymentStatus::Failed => Ok(Transition::AlreadyApplied),
            _ => Err(self.illegal(PaymentStatus::Failed)),
        }
    }

    /// Returns the money of a completed payment.
    pub fn refund(
        &mut self,
        reason: Option<i32>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        match self.status {
            PaymentStatus::Completed => {
                self.status = PaymentStatus::Refunded;
                self.cancel_reason = reason;
                self.error_message = Some(message.into());
                self.cancelled_at = Some(now);
                Ok(Transition::Applied)
            }
            PaymentStatus::Refunded => Ok(Transition::AlreadyApplied),
            _ => Err(self.illegal(PaymentStatus::Refunded)),
        }
    }

    /// Retires a pending payment that a newer checkout superseded.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<Transition> {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Expired;
                self.error_message = Some("Superseded by a newer payment".to_string());
                self.cancelled_at = Some(now);
                Ok(Transition::Applied)
            }
            PaymentStatus::Expired => Ok(Transition::AlreadyApplied),
            _ => Err(self.illegal(PaymentStatus::Expired)),
        }
    }

    /// Provider-initiated cancellation.
    ///
    /// A pending payment fails, a completed one is refunded. Cancelling an
    /// already cancelled payment (failed, refunded or expired) is a no-op.
    pub fn cancel(&mut self, reason: Option<i32>, now: DateTime<Utc>) -> Result<Transition> {
        let reason_text = reason.map_or_else(|| "unspecified".to_string(), |r| r.to_string());
        match self.status {
            PaymentStatus::Pending => {
                let transition =
                    self.fail(None, format!("Cancelled by provider, reason: {reason_text}"), now)?;
                self.cancel_reason = reason;
                Ok(transition)
            }
            PaymentStatus::Completed => {
                self.refund(reason, format!("Refunded by provider, reason: {reason_text}"), now)
            }
            PaymentStatus::Failed | PaymentStatus::Refunded | PaymentStatus::Expired => {
                Ok(Transition::AlreadyApplied)
            }
        }
    }

    /// Correlation ids that must be unique across every payment row.
    pub fn unique_keys(&self) -> Vec<(&'static str, String)> {
        let mut keys = vec![("external_id", self.external_id.clone())];
        if let Some(id) = &self.merchant_trans_id {
            keys.push(("merchant_trans_id", id.clone()));
        }
        if let Some(id) = self.merchant_prepare_id {
            keys.push(("merchant_prepare_id", id.to_string()));
        }
        if let Some(id) = self.click_trans_id {
            keys.push(("click_trans_id", id.to_string()));
        }
        if let Some(id) = &self.payme_receipt_id {
            keys.push(("payme_receipt_id", id.clone()));
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending() -> Payment {
        NewPayment {
            user_id: 1,
            amount: dec!(350000),
            currency: "UZS".to_string(),
            provider: PaymentProvider::Click,
            external_id: "PAY_TEST".to_string(),
            merchant_trans_id: Some("subscription_1_1_0".to_string()),
            payme_receipt_id: None,
            created_at: Utc::now(),
        }
        .into_payment(1)
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut payment = pending();
        let now = Utc::now();
        assert_eq!(payment.complete(now).unwrap(), Transition::Applied);
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.complete(now).unwrap(), Transition::AlreadyApplied);
        assert_eq!(payment.performed_at, Some(now));
    }

    #[test]
    fn test_terminal_states_never_transition_again() {
        let now = Utc::now();

        let mut failed = pending();
        failed.fail(Some(-5017), "Insufficient funds", now).unwrap();
        assert!(matches!(
            failed.complete(now),
            Err(FulfillmentError::InvalidState(_))
        ));
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.error_code, Some(-5017));

        let mut expired = pending();
        expired.expire(now).unwrap();
        assert!(expired.complete(now).is_err());
        assert!(expired.fail(None, "late", now).is_err());
    }

    #[test]
    fn test_refund_requires_completion() {
        let now = Utc::now();
        let mut payment = pending();
        assert!(payment.refund(None, "refund", now).is_err());
        payment.complete(now).unwrap();
        assert_eq!(
            payment.refund(Some(5), "refund", now).unwrap(),
            Transition::Applied
        );
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert!(payment.complete(now).is_err());
    }

    #[test]
    fn test_cancel_pending_fails_and_completed_refunds() {
        let now = Utc::now();

        let mut payment = pending();
        assert_eq!(payment.cancel(Some(3), now).unwrap(), Transition::Applied);
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.cancel_reason, Some(3));
        assert_eq!(
            payment.cancel(Some(3), now).unwrap(),
            Transition::AlreadyApplied
        );

        let mut paid = pending();
        paid.complete(now).unwrap();
        assert_eq!(paid.cancel(Some(5), now).unwrap(), Transition::Applied);
        assert_eq!(paid.status, PaymentStatus::Refunded);
        assert_eq!(paid.cancel_reason, Some(5));
    }

    #[test]
    fn test_unique_keys() {
        let mut payment = pending();
        payment.merchant_prepare_id = Some(1);
        let keys = payment.unique_keys();
        assert!(keys.contains(&("external_id", "PAY_TEST".to_string())));
        assert!(keys.contains(&("merchant_trans_id", "subscription_1_1_0".to_string())));
        assert!(keys.contains(&("merchant_prepare_id", "1".to_string())));
        assert_eq!(keys.len(), 3);
    }
}
