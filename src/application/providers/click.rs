use super::{ProviderAdapter, RawCallback};
use crate::application::ledger::PaymentLedger;
use crate::domain::money::{amount_matches, sums_to_tiyin};
use crate::domain::payment::{Payment, PaymentProvider, PaymentStatus};
use crate::domain::ports::{ClockRef, DatabaseRef, PaymentKey, PaymentRepository, UnitOfWork};
use crate::error::FulfillmentError;
use async_trait::async_trait;
use md5::{Digest, Md5};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const ACTION_PREPARE: i32 = 0;
pub const ACTION_COMPLETE: i32 = 1;

/// Prepare/Complete request as Click sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickCallback {
    pub click_trans_id: i64,
    pub service_id: i64,
    #[serde(default)]
    pub click_paydoc_id: Option<i64>,
    pub merchant_trans_id: String,
    #[serde(default)]
    pub merchant_prepare_id: Option<i64>,
    /// Amount in sums, as Click formats it.
    pub amount: Decimal,
    pub action: i32,
    #[serde(default)]
    pub error: i32,
    #[serde(default)]
    pub error_note: String,
    pub sign_time: String,
    #[serde(default)]
    pub sign_string: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickResponse {
    pub click_trans_id: i64,
    pub merchant_trans_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_prepare_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_confirm_id: Option<i64>,
    pub error: i32,
    pub error_note: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClickError {
    #[error("SIGN CHECK FAILED!")]
    SignCheckFailed,
    #[error("Incorrect parameter amount")]
    InvalidAmount,
    #[error("Action not found")]
    ActionNotFound,
    #[error("User does not exist")]
    PaymentNotFound,
    #[error("Transaction does not exist")]
    TransactionNotFound,
    #[error("Error in request from click")]
    BadRequest,
    #[error("Transaction cancelled")]
    TransactionCancelled,
    #[error(transparent)]
    Internal(#[from] FulfillmentError),
}

impl ClickError {
    pub fn code(&self) -> i32 {
        match self {
            ClickError::SignCheckFailed => -1,
            ClickError::InvalidAmount => -2,
            ClickError::ActionNotFound => -3,
            ClickError::PaymentNotFound => -5,
            ClickError::TransactionNotFound => -6,
            ClickError::BadRequest | ClickError::Internal(_) => -8,
            ClickError::TransactionCancelled => -9,
        }
    }

    /// Text sent back to Click. Internal details stay in the logs.
    pub fn note(&self) -> String {
        match self {
            ClickError::Internal(_) => "System error".to_string(),
            other => other.to_string(),
        }
    }
}

/// MD5 request signature as documented by Click.
pub fn click_signature(secret: &str, callback: &ClickCallback) -> String {
    let prepare_id = callback
        .merchant_prepare_id
        .map(|id| id.to_string())
        .unwrap_or_default();
    let raw = format!(
        "{}{}{}{}{}{}{}{}",
        callback.click_trans_id,
        callback.service_id,
        secret,
        callback.merchant_trans_id,
        prepare_id,
        callback.amount,
        callback.action,
        callback.sign_time
    );
    hex::encode(Md5::digest(raw.as_bytes()))
}

fn generic_system_error() -> Value {
    json!({ "error": -8, "error_note": "System error" })
}

#[derive(Clone)]
pub struct ClickAdapter {
    db: DatabaseRef,
    clock: ClockRef,
    ledger: PaymentLedger,
}

impl ClickAdapter {
    pub fn new(db: DatabaseRef, clock: ClockRef, ledger: PaymentLedger) -> Self {
        Self { db, clock, ledger }
    }

    fn verify(&self, callback: &ClickCallback) -> Result<(), ClickError> {
        let settings = self.ledger.settings();
        if !settings.verifies_signatures() {
            return Ok(());
        }
        let secret = settings.click_secret_key.as_deref().ok_or_else(|| {
            tracing::error!("Click secret key is not configured");
            ClickError::BadRequest
        })?;
        if let Some(service_id) = settings.click_service_id
            && service_id != callback.service_id
        {
            return Err(ClickError::BadRequest);
        }
        let expected = click_signature(secret, callback);
        if !expected.eq_ignore_ascii_case(callback.sign_string.trim()) {
            return Err(ClickError::SignCheckFailed);
        }
        Ok(())
    }

    fn check_amount(payment: &Payment, callback: &ClickCallback) -> Result<(), ClickError> {
        let received = sums_to_tiyin(callback.amount).map_err(|_| ClickError::InvalidAmount)?;
        if amount_matches(payment.amount, received) {
            Ok(())
        } else {
            Err(ClickError::InvalidAmount)
        }
    }

    /// Returns the `merchant_prepare_id` to echo back.
    async fn prepare(&self, callback: &ClickCallback) -> Result<i64, ClickError> {
        let mut uow = self.db.begin().await?;
        let mut payment = uow
            .find_payment(PaymentKey::MerchantTrans(callback.merchant_trans_id.clone()))
            .await?
            .filter(|p| p.provider == PaymentProvider::Click)
            .ok_or(ClickError::PaymentNotFound)?;
        Self::check_amount(&payment, callback)?;

        match payment.status {
            PaymentStatus::Completed => Ok(payment.merchant_prepare_id.unwrap_or(payment.id)),
            PaymentStatus::Failed | PaymentStatus::Expired | PaymentStatus::Refunded => {
                Err(ClickError::TransactionCancelled)
            }
            PaymentStatus::Pending => {
                if payment.merchant_prepare_id != Some(payment.id)
                    || payment.click_trans_id != Some(callback.click_trans_id)
                {
                    payment.merchant_prepare_id = Some(payment.id);
                    payment.click_trans_id = Some(callback.click_trans_id);
                    uow.update_payment(&payment).await?;
                    uow.commit().await?;
                    tracing::info!(
                        payment_id = payment.id,
                        click_trans_id = callback.click_trans_id,
                        "click prepare accepted"
                    );
                }
                Ok(payment.id)
            }
        }
    }

    /// Returns the `merchant_confirm_id` to echo back.
    async fn complete(&self, callback: &ClickCallback) -> Result<i64, ClickError> {
        let prepare_id = callback
            .merchant_prepare_id
            .ok_or(ClickError::TransactionNotFound)?;
        let mut uow = self.db.begin().await?;
        let payment = uow
            .find_payment(PaymentKey::MerchantPrepare(prepare_id))
            .await?
            .filter(|p| p.merchant_trans_id.as_deref() == Some(callback.merchant_trans_id.as_str()))
            .ok_or(ClickError::TransactionNotFound)?;
        Self::check_amount(&payment, callback)?;

        match payment.status {
            PaymentStatus::Completed => Ok(payment.id),
            PaymentStatus::Failed | PaymentStatus::Expired | PaymentStatus::Refunded => {
                Err(ClickError::TransactionCancelled)
            }
            PaymentStatus::Pending if callback.error == 0 => {
                let now = self.clock.now();
                let settlement = self.ledger.settle_in(uow.as_mut(), payment, now).await?;
                uow.commit().await?;
                Ok(settlement.payment.id)
            }
            PaymentStatus::Pending => {
                let now = self.clock.now();
                let note = if callback.error_note.is_empty() {
                    "Cancelled by Click"
                } else {
                    callback.error_note.as_str()
                };
                self.ledger
                    .fail_in(uow.as_mut(), payment, Some(callback.error), note, now)
                    .await?;
                uow.commit().await?;
                Err(ClickError::TransactionCancelled)
            }
        }
    }

    pub async fn respond(&self, callback: &ClickCallback) -> ClickResponse {
        let mut response = ClickResponse {
            click_trans_id: callback.click_trans_id,
            merchant_trans_id: callback.merchant_trans_id.clone(),
            merchant_prepare_id: None,
            merchant_confirm_id: None,
            error: 0,
            error_note: "Success".to_string(),
        };

        let outcome = match self.verify(callback) {
            Err(e) => Err(e),
            Ok(()) => match callback.action {
                ACTION_PREPARE => self
                    .prepare(callback)
                    .await
                    .map(|id| response.merchant_prepare_id = Some(id)),
                ACTION_COMPLETE => self
                    .complete(callback)
                    .await
                    .map(|id| response.merchant_confirm_id = Some(id)),
                _ => Err(ClickError::ActionNotFound),
            },
        };

        if let Err(e) = outcome {
            match &e {
                ClickError::Internal(source) => tracing::error!(
                    error = %source,
                    merchant_trans_id = %callback.merchant_trans_id,
                    "click callback failed"
                ),
                other => tracing::warn!(
                    code = other.code(),
                    merchant_trans_id = %callback.merchant_trans_id,
                    action = callback.action,
                    "click callback rejected: {other}"
                ),
            }
            response.error = e.code();
            response.error_note = e.note();
        }
        response
    }
}

#[async_trait]
impl ProviderAdapter for ClickAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Click
    }

    async fn handle(&self, callback: RawCallback) -> Value {
        let request: ClickCallback = match serde_json::from_str(&callback.body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable click callback");
                return generic_system_error();
            }
        };
        let response = self.respond(&request).await;
        serde_json::to_value(response).unwrap_or_else(|_| generic_system_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn callback() -> ClickCallback {
        ClickCallback {
            click_trans_id: 100,
            service_id: 42,
            click_paydoc_id: None,
            merchant_trans_id: "subscription_1_1_0".to_string(),
            merchant_prepare_id: None,
            amount: dec!(350000.00),
            action: ACTION_PREPARE,
            error: 0,
            error_note: String::new(),
            sign_time: "2026-01-01 10:00:00".to_string(),
            sign_string: String::new(),
        }
    }

    #[test]
    fn test_signature_covers_every_field() {
        let base = click_signature("secret", &callback());
        assert_eq!(base.len(), 32);

        let mut other = callback();
        other.merchant_prepare_id = Some(1);
        assert_ne!(click_signature("secret", &other), base);
        assert_ne!(click_signature("other", &callback()), base);

        let expected = hex::encode(Md5::digest(
            "10042secretsubscription_1_1_0350000.0002026-01-01 10:00:00".as_bytes(),
        ));
        assert_eq!(base, expected);
    }

    #[test]
    fn test_error_codes_and_notes() {
        assert_eq!(ClickError::SignCheckFailed.code(), -1);
        assert_eq!(ClickError::TransactionCancelled.code(), -9);
        let internal = ClickError::from(FulfillmentError::Conflict("secret detail".into()));
        assert_eq!(internal.code(), -8);
        assert_eq!(internal.note(), "System error");
    }

    #[test]
    fn test_response_omits_missing_ids() {
        let response = ClickResponse {
            click_trans_id: 1,
            merchant_trans_id: "m".to_string(),
            merchant_prepare_id: Some(5),
            merchant_confirm_id: None,
            error: 0,
            error_note: "Success".to_string(),
        };
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["merchant_prepare_id"], 5);
        assert!(value.get("merchant_confirm_id").is_none());
    }
}
