use crate::application::engine::FulfillmentEngine;
use crate::application::providers::RawCallback;
use crate::domain::catalog::CategoryId;
use crate::domain::customer::{ChildId, DeliveryInfoId};
use crate::domain::payment::{PaymentId, PaymentProvider, UserId};
use crate::domain::ports::GatewayStatus;
use crate::domain::subscription::{PlanId, SubscriptionId};
use crate::domain::toy_box::{ToyBoxId, ToyBoxStatus};
use crate::error::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeSet;

/// One replayable operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    RegisterChild {
        user_id: UserId,
        name: String,
        #[serde(default)]
        interests: BTreeSet<String>,
        #[serde(default)]
        skills: BTreeSet<String>,
    },
    UpdateChild {
        user_id: UserId,
        child_id: ChildId,
        #[serde(default)]
        interests: BTreeSet<String>,
        #[serde(default)]
        skills: BTreeSet<String>,
    },
    RemoveChild {
        user_id: UserId,
        child_id: ChildId,
    },
    AddDeliveryInfo {
        user_id: UserId,
        address: String,
        #[serde(default)]
        preferred_date: Option<NaiveDate>,
        #[serde(default)]
        preferred_time: Option<String>,
    },
    Order {
        user_id: UserId,
        child_id: ChildId,
        plan_id: PlanId,
        #[serde(default)]
        delivery_info_id: Option<DeliveryInfoId>,
    },
    Pause {
        user_id: UserId,
        subscription_id: SubscriptionId,
    },
    Resume {
        user_id: UserId,
        subscription_id: SubscriptionId,
    },
    CreatePayment {
        user_id: UserId,
        amount: Decimal,
        #[serde(default)]
        currency: Option<String>,
    },
    Checkout {
        user_id: UserId,
        subscription_ids: Vec<SubscriptionId>,
        provider: PaymentProvider,
    },
    Process {
        payment_id: PaymentId,
    },
    Webhook {
        external_id: String,
        status: GatewayStatus,
    },
    Refund {
        payment_id: PaymentId,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Click callback. A string body is passed through untouched.
    Click {
        body: Value,
    },
    Payme {
        #[serde(default)]
        signature: Option<String>,
        body: Value,
    },
    CreateBox {
        subscription_id: SubscriptionId,
    },
    AdvanceBox {
        box_id: ToyBoxId,
        status: ToyBoxStatus,
    },
    Review {
        box_id: ToyBoxId,
        user_id: UserId,
        rating: u8,
        #[serde(default)]
        comment: Option<String>,
    },
    Preview {
        child_id: ChildId,
    },
    Reserve {
        category_id: CategoryId,
        quantity: u32,
    },
    Release {
        category_id: CategoryId,
        quantity: u32,
    },
    Stock,
}

fn raw_body(body: Value) -> String {
    match body {
        Value::String(raw) => raw,
        other => other.to_string(),
    }
}

impl Command {
    /// Runs the command and returns a JSON rendering of its result.
    pub async fn apply(self, engine: &FulfillmentEngine) -> Result<Value> {
        let outcome = match self {
            Command::RegisterChild {
                user_id,
                name,
                interests,
                skills,
            } => json!(
                engine
                    .subscriptions()
                    .register_child(user_id, &name, interests, skills)
                    .await?
            ),
            Command::UpdateChild {
                user_id,
                child_id,
                interests,
                skills,
            } => json!(
                engine
                    .subscriptions()
                    .update_child_tags(user_id, child_id, interests, skills)
                    .await?
            ),
            Command::RemoveChild { user_id, child_id } => {
                engine.subscriptions().remove_child(user_id, child_id).await?;
                json!({ "removed": child_id })
            }
            Command::AddDeliveryInfo {
                user_id,
                address,
                preferred_date,
                preferred_time,
            } => json!(
                engine
                    .subscriptions()
                    .add_delivery_info(user_id, &address, preferred_date, preferred_time)
                    .await?
            ),
            Command::Order {
                user_id,
                child_id,
                plan_id,
                delivery_info_id,
            } => json!(
                engine
                    .subscriptions()
                    .order_subscription(user_id, child_id, plan_id, delivery_info_id)
                    .await?
            ),
            Command::Pause {
                user_id,
                subscription_id,
            } => json!(engine.subscriptions().pause(user_id, subscription_id).await?),
            Command::Resume {
                user_id,
                subscription_id,
            } => json!(engine.subscriptions().resume(user_id, subscription_id).await?),
            Command::CreatePayment {
                user_id,
                amount,
                currency,
            } => {
                let currency = currency.unwrap_or_else(|| engine.settings().currency.clone());
                json!(
                    engine
                        .payments()
                        .create_payment(user_id, amount, &currency)
                        .await?
                )
            }
            Command::Checkout {
                user_id,
                subscription_ids,
                provider,
            } => json!(
                engine
                    .payments()
                    .checkout(user_id, &subscription_ids, provider)
                    .await?
            ),
            Command::Process { payment_id } => json!(engine.payments().process(payment_id).await?),
            Command::Webhook {
                external_id,
                status,
            } => json!(
                engine
                    .payments()
                    .handle_gateway_webhook(&external_id, status)
                    .await?
            ),
            Command::Refund { payment_id, reason } => {
                let reason = reason.as_deref().unwrap_or("Refunded on request");
                json!(engine.payments().refund(payment_id, reason).await?)
            }
            Command::Click { body } => {
                engine
                    .callbacks()
                    .dispatch(PaymentProvider::Click, RawCallback::new(raw_body(body)))
                    .await?
            }
            Command::Payme { signature, body } => {
                let callback = RawCallback {
                    body: raw_body(body),
                    signature,
                };
                engine
                    .callbacks()
                    .dispatch(PaymentProvider::Payme, callback)
                    .await?
            }
            Command::CreateBox { subscription_id } => json!(
                engine
                    .allocator()
                    .create_box_for_subscription(subscription_id)
                    .await?
            ),
            Command::AdvanceBox { box_id, status } => {
                json!(engine.allocator().advance_box(box_id, status).await?)
            }
            Command::Review {
                box_id,
                user_id,
                rating,
                comment,
            } => json!(
                engine
                    .allocator()
                    .add_review(box_id, user_id, rating, comment)
                    .await?
            ),
            Command::Preview { child_id } => {
                json!(engine.allocator().next_box_preview(child_id).await?)
            }
            Command::Reserve {
                category_id,
                quantity,
            } => json!(engine.inventory().reserve(category_id, quantity).await?),
            Command::Release {
                category_id,
                quantity,
            } => json!(engine.inventory().release(category_id, quantity).await?),
            Command::Stock => json!(engine.inventory().stock_report().await?),
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_tagged_commands() {
        let command: Command = serde_json::from_str(
            r#"{"command":"checkout","user_id":1,"subscription_ids":[2,3],"provider":"click"}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            Command::Checkout {
                user_id: 1,
                subscription_ids: vec![2, 3],
                provider: PaymentProvider::Click,
            }
        );

        let command: Command =
            serde_json::from_str(r#"{"command":"advance_box","box_id":4,"status":"RETURNED"}"#)
                .unwrap();
        assert_eq!(
            command,
            Command::AdvanceBox {
                box_id: 4,
                status: ToyBoxStatus::Returned
            }
        );
    }

    #[test]
    fn test_raw_body_keeps_strings_verbatim() {
        assert_eq!(raw_body(json!("{\"a\": 1}")), "{\"a\": 1}");
        assert_eq!(raw_body(json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn test_rejects_unknown_command() {
        assert!(serde_json::from_str::<Command>(r#"{"command":"launch"}"#).is_err());
    }
}
