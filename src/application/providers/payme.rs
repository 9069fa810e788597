use super::{ProviderAdapter, RawCallback};
use crate::application::ledger::{OpenPayment, PaymentLedger};
use crate::application::subscriptions::{owned_child_in, status_in};
use crate::domain::money::{Tiyin, amount_matches, round_sums};
use crate::domain::payment::{Payment, PaymentProvider, PaymentStatus, UserId};
use crate::domain::ports::{
    ClockRef, DatabaseRef, PaymentKey, PaymentRepository, SubscriptionRepository, UnitOfWork,
};
use crate::domain::subscription::{Subscription, SubscriptionId, SubscriptionStatus};
use crate::error::FulfillmentError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const STATE_CREATED: i32 = 1;
pub const STATE_PERFORMED: i32 = 2;
pub const STATE_CANCELLED: i32 = -1;
pub const STATE_CANCELLED_AFTER_PERFORM: i32 = -2;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// The `account` object Payme echoes from checkout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymeAccount {
    pub user_id: UserId,
    pub subscription_ids: Vec<SubscriptionId>,
}

#[derive(Debug, Deserialize)]
struct CheckPerformParams {
    amount: i64,
    account: PaymeAccount,
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    id: String,
    amount: i64,
    account: PaymeAccount,
}

#[derive(Debug, Deserialize)]
struct TransactionParams {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CancelParams {
    id: String,
    #[serde(default)]
    reason: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymeError {
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Transaction not found")]
    TransactionNotFound,
    #[error("Unable to perform operation")]
    UnableToPerform,
    #[error("Invalid account")]
    InvalidAccount,
    #[error("Invalid request")]
    InvalidRequest,
    #[error("Insufficient privilege")]
    InsufficientPrivilege,
    #[error("Method not found")]
    MethodNotFound,
    #[error("System error")]
    SystemError,
    #[error(transparent)]
    Internal(#[from] FulfillmentError),
}

impl PaymeError {
    pub fn code(&self) -> i32 {
        match self {
            PaymeError::InvalidAmount => -31001,
            PaymeError::TransactionNotFound => -31003,
            PaymeError::UnableToPerform => -31008,
            PaymeError::InvalidAccount => -31050,
            PaymeError::InvalidRequest => -32600,
            PaymeError::InsufficientPrivilege => -32504,
            PaymeError::MethodNotFound => -32601,
            PaymeError::SystemError | PaymeError::Internal(_) => -32400,
        }
    }

    fn message(&self) -> String {
        match self {
            PaymeError::Internal(_) => "System error".to_string(),
            other => other.to_string(),
        }
    }

    fn data(&self) -> Option<&'static str> {
        match self {
            PaymeError::InvalidAccount => Some("account"),
            PaymeError::InvalidAmount => Some("amount"),
            _ => None,
        }
    }
}

fn body_mac(secret: &str, body: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body.as_bytes());
    Some(mac)
}

/// HMAC-SHA256 of the raw body, hex encoded.
pub fn payme_signature(secret: &str, body: &str) -> Option<String> {
    body_mac(secret, body).map(|mac| hex::encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &str, body: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    body_mac(secret, body).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}

/// Payme-facing transaction state of a payment.
pub fn payme_state(payment: &Payment) -> i32 {
    match payment.status {
        PaymentStatus::Pending => STATE_CREATED,
        PaymentStatus::Completed => STATE_PERFORMED,
        PaymentStatus::Failed | PaymentStatus::Expired => STATE_CANCELLED,
        PaymentStatus::Refunded => STATE_CANCELLED_AFTER_PERFORM,
    }
}

fn millis(at: Option<DateTime<Utc>>) -> i64 {
    at.map_or(0, |at| at.timestamp_millis())
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, PaymeError> {
    serde_json::from_value(params).map_err(|e| {
        tracing::warn!(error = %e, "malformed payme params");
        PaymeError::InvalidRequest
    })
}

fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn failure(id: Value, error: &PaymeError) -> Value {
    let mut body = json!({ "code": error.code(), "message": error.message() });
    if let Some(data) = error.data() {
        body["data"] = json!(data);
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": body })
}

#[derive(Clone)]
pub struct PaymeAdapter {
    db: DatabaseRef,
    clock: ClockRef,
    ledger: PaymentLedger,
}

impl PaymeAdapter {
    pub fn new(db: DatabaseRef, clock: ClockRef, ledger: PaymentLedger) -> Self {
        Self { db, clock, ledger }
    }

    fn verify(&self, callback: &RawCallback) -> Result<(), PaymeError> {
        let settings = self.ledger.settings();
        if !settings.verifies_signatures() {
            return Ok(());
        }
        let secret = settings.payme_secret_key.as_deref().ok_or_else(|| {
            tracing::error!("Payme secret key is not configured");
            PaymeError::SystemError
        })?;
        let signature = callback
            .signature
            .as_deref()
            .ok_or(PaymeError::InsufficientPrivilege)?;
        if verify_signature(secret, &callback.body, signature) {
            Ok(())
        } else {
            Err(PaymeError::InsufficientPrivilege)
        }
    }

    /// Validates the account and returns its subscriptions with their total.
    async fn account_in(
        &self,
        uow: &mut dyn UnitOfWork,
        account: &PaymeAccount,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Subscription>, Decimal), PaymeError> {
        let mut ids = account.subscription_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Err(PaymeError::InvalidAccount);
        }

        let mut subscriptions = Vec::with_capacity(ids.len());
        let mut total = Decimal::ZERO;
        for id in ids {
            let subscription = uow
                .subscription(id)
                .await?
                .ok_or(PaymeError::InvalidAccount)?;
            match owned_child_in(uow, subscription.child_id, account.user_id).await {
                Ok(_) => {}
                Err(FulfillmentError::NotFound { .. } | FulfillmentError::ValidationError(_)) => {
                    return Err(PaymeError::InvalidAccount);
                }
                Err(e) => return Err(e.into()),
            }
            let status = status_in(uow, &subscription, now).await?;
            if !matches!(
                status,
                SubscriptionStatus::PendingPayment | SubscriptionStatus::Expired
            ) {
                return Err(PaymeError::InvalidAccount);
            }
            total += subscription.individual_price;
            subscriptions.push(subscription);
        }
        Ok((subscriptions, round_sums(total)))
    }

    fn check_amount(&self, total: Decimal, amount: i64) -> Result<(), PaymeError> {
        if !self.ledger.settings().amount_bounds().contains(total) {
            return Err(PaymeError::InvalidAmount);
        }
        if !amount_matches(total, Tiyin(amount)) {
            return Err(PaymeError::InvalidAmount);
        }
        Ok(())
    }

    async fn check_perform(&self, params: CheckPerformParams) -> Result<Value, PaymeError> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let (_, total) = self.account_in(uow.as_mut(), &params.account, now).await?;
        self.check_amount(total, params.amount)?;
        Ok(json!({ "allow": true }))
    }

    /// A pending Payme checkout that covers exactly `subscriptions` and has no
    /// receipt yet.
    async fn reusable_checkout_in(
        &self,
        uow: &mut dyn UnitOfWork,
        subscriptions: &[Subscription],
    ) -> Result<Option<Payment>, PaymeError> {
        let Some(payment_id) = subscriptions.first().and_then(|s| s.payment_id) else {
            return Ok(None);
        };
        if subscriptions.iter().any(|s| s.payment_id != Some(payment_id)) {
            return Ok(None);
        }
        let Some(payment) = uow.payment(payment_id).await? else {
            return Ok(None);
        };
        if payment.provider != PaymentProvider::Payme
            || payment.status != PaymentStatus::Pending
            || payment.payme_receipt_id.is_some()
        {
            return Ok(None);
        }
        let linked = uow.subscriptions_for_payment(payment_id).await?;
        Ok((linked.len() == subscriptions.len()).then_some(payment))
    }

    async fn create(&self, params: CreateParams) -> Result<Value, PaymeError> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;

        if let Some(existing) = uow
            .find_payment(PaymentKey::PaymeReceipt(params.id.clone()))
            .await?
        {
            if existing.status != PaymentStatus::Pending {
                return Err(PaymeError::UnableToPerform);
            }
            return Ok(json!({
                "create_time": existing.created_at.timestamp_millis(),
                "transaction": existing.id.to_string(),
                "state": STATE_CREATED,
            }));
        }

        let (subscriptions, total) = self.account_in(uow.as_mut(), &params.account, now).await?;
        self.check_amount(total, params.amount)?;

        let payment = match self.reusable_checkout_in(uow.as_mut(), &subscriptions).await? {
            Some(mut payment) => {
                payment.payme_receipt_id = Some(params.id.clone());
                uow.update_payment(&payment).await?;
                payment
            }
            None => {
                self.ledger
                    .open_in(
                        uow.as_mut(),
                        OpenPayment {
                            user_id: params.account.user_id,
                            amount: total,
                            currency: self.ledger.settings().currency.clone(),
                            provider: PaymentProvider::Payme,
                            external_id: format!("PAYME_{}", params.id),
                            merchant_trans_id: None,
                            payme_receipt_id: Some(params.id.clone()),
                            subscription_ids: subscriptions.iter().map(|s| s.id).collect(),
                        },
                        now,
                    )
                    .await?
            }
        };
        uow.commit().await?;
        tracing::info!(payment_id = payment.id, receipt = %params.id, "payme transaction created");

        Ok(json!({
            "create_time": payment.created_at.timestamp_millis(),
            "transaction": payment.id.to_string(),
            "state": STATE_CREATED,
        }))
    }

    async fn perform(&self, params: TransactionParams) -> Result<Value, PaymeError> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let payment = uow
            .find_payment(PaymentKey::PaymeReceipt(params.id))
            .await?
            .ok_or(PaymeError::TransactionNotFound)?;

        let payment = match payment.status {
            PaymentStatus::Completed => payment,
            PaymentStatus::Pending => {
                let settlement = self.ledger.settle_in(uow.as_mut(), payment, now).await?;
                uow.commit().await?;
                settlement.payment
            }
            PaymentStatus::Failed | PaymentStatus::Expired | PaymentStatus::Refunded => {
                return Err(PaymeError::UnableToPerform);
            }
        };

        Ok(json!({
            "transaction": payment.id.to_string(),
            "perform_time": millis(payment.performed_at),
            "state": STATE_PERFORMED,
        }))
    }

    async fn cancel(&self, params: CancelParams) -> Result<Value, PaymeError> {
        let now = self.clock.now();
        let mut uow = self.db.begin().await?;
        let payment = uow
            .find_payment(PaymentKey::PaymeReceipt(params.id))
            .await?
            .ok_or(PaymeError::TransactionNotFound)?;

        let (payment, _) = self
            .ledger
            .cancel_in(uow.as_mut(), payment, params.reason, now)
            .await?;
        uow.commit().await?;

        Ok(json!({
            "transaction": payment.id.to_string(),
            "cancel_time": millis(payment.cancelled_at),
            "state": payme_state(&payment),
        }))
    }

    async fn check(&self, params: TransactionParams) -> Result<Value, PaymeError> {
        let mut uow = self.db.begin().await?;
        let payment = uow
            .find_payment(PaymentKey::PaymeReceipt(params.id))
            .await?
            .ok_or(PaymeError::TransactionNotFound)?;

        Ok(json!({
            "create_time": payment.created_at.timestamp_millis(),
            "perform_time": millis(payment.performed_at),
            "cancel_time": millis(payment.cancelled_at),
            "transaction": payment.id.to_string(),
            "state": payme_state(&payment),
            "reason": payment.cancel_reason,
        }))
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, PaymeError> {
        match method {
            "CheckPerformTransaction" => self.check_perform(parse_params(params)?).await,
            "CreateTransaction" => self.create(parse_params(params)?).await,
            "PerformTransaction" => self.perform(parse_params(params)?).await,
            "CancelTransaction" => self.cancel(parse_params(params)?).await,
            "CheckTransaction" => self.check(parse_params(params)?).await,
            _ => Err(PaymeError::MethodNotFound),
        }
    }
}

#[async_trait]
impl ProviderAdapter for PaymeAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Payme
    }

    async fn handle(&self, callback: RawCallback) -> Value {
        let request: RpcRequest = match serde_json::from_str(&callback.body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable payme request");
                return failure(Value::Null, &PaymeError::SystemError);
            }
        };
        if let Err(e) = self.verify(&callback) {
            tracing::warn!(code = e.code(), method = %request.method, "payme request rejected");
            return failure(request.id, &e);
        }

        match self.dispatch(&request.method, request.params).await {
            Ok(result) => success(request.id, result),
            Err(e) => {
                match &e {
                    PaymeError::Internal(source) => tracing::error!(
                        error = %source,
                        method = %request.method,
                        "payme request failed"
                    ),
                    other => tracing::warn!(
                        code = other.code(),
                        method = %request.method,
                        "payme request rejected: {other}"
                    ),
                }
                failure(request.id, &e)
            }
        }
    }
}
