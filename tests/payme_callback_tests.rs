mod common;

use common::{PAYME_SECRET, TestApp, USER};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use toybox_fulfillment::application::providers::RawCallback;
use toybox_fulfillment::application::providers::payme::payme_signature;
use toybox_fulfillment::config::Settings;
use toybox_fulfillment::domain::payment::{PaymentProvider, PaymentStatus};
use toybox_fulfillment::domain::ports::{CatalogRepository, Database};
use toybox_fulfillment::domain::subscription::{SubscriptionId, SubscriptionPlan, SubscriptionStatus};
use toybox_fulfillment::infrastructure::gateway::MockGateway;

fn rpc(method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 11, "method": method, "params": params }).to_string()
}

fn account(subscription_id: SubscriptionId) -> Value {
    json!({ "user_id": USER, "subscription_ids": [subscription_id] })
}

/// A 12345.00 plan so amounts are easy to follow in tiyin.
async fn app_with_test_plan() -> (TestApp, SubscriptionId) {
    let app = TestApp::new().await;
    let mut uow = app.db.begin().await.unwrap();
    uow.upsert_plan(SubscriptionPlan {
        id: 3,
        name: "Тестовый".to_string(),
        price_monthly: dec!(12345.00),
        toy_count: 6,
    })
    .await
    .unwrap();
    uow.commit().await.unwrap();
    drop(uow);

    let (_, subscription) = app.subscribe("Ali", &["Развивающие"], &["Логика"], 3).await;
    (app, subscription.id)
}

async fn call(app: &TestApp, method: &str, params: Value) -> Value {
    app.payme(RawCallback::new(rpc(method, params))).await
}

#[tokio::test]
async fn test_full_transaction_lifecycle() {
    let (app, subscription_id) = app_with_test_plan().await;

    let check = call(
        &app,
        "CheckPerformTransaction",
        json!({ "amount": 1234500, "account": account(subscription_id) }),
    )
    .await;
    assert_eq!(check["jsonrpc"], "2.0");
    assert_eq!(check["id"], 11);
    assert_eq!(check["result"]["allow"], true);

    let create_params = json!({
        "id": "rcpt-1",
        "time": 1772445600000i64,
        "amount": 1234500,
        "account": account(subscription_id),
    });
    let created = call(&app, "CreateTransaction", create_params.clone()).await;
    assert_eq!(created["result"]["state"], 1);
    let transaction = created["result"]["transaction"].as_str().unwrap().to_string();

    let again = call(&app, "CreateTransaction", create_params.clone()).await;
    assert_eq!(again["result"]["transaction"], transaction.as_str());
    assert_eq!(again["result"]["create_time"], created["result"]["create_time"]);

    let performed = call(&app, "PerformTransaction", json!({ "id": "rcpt-1" })).await;
    assert_eq!(performed["result"]["state"], 2);
    assert_eq!(performed["result"]["transaction"], transaction.as_str());
    assert!(performed["result"]["perform_time"].as_i64().unwrap() > 0);
    assert_eq!(app.status(subscription_id).await, SubscriptionStatus::Active);
    assert_eq!(app.boxes().await.len(), 1);

    let replay = call(&app, "PerformTransaction", json!({ "id": "rcpt-1" })).await;
    assert_eq!(replay["result"]["state"], 2);
    assert_eq!(app.boxes().await.len(), 1);

    let status = call(&app, "CheckTransaction", json!({ "id": "rcpt-1" })).await;
    assert_eq!(status["result"]["state"], 2);
    assert_eq!(status["result"]["cancel_time"], 0);
    assert_eq!(status["result"]["reason"], Value::Null);

    let cancelled = call(
        &app,
        "CancelTransaction",
        json!({ "id": "rcpt-1", "reason": 5 }),
    )
    .await;
    assert_eq!(cancelled["result"]["state"], -2);
    assert!(cancelled["result"]["cancel_time"].as_i64().unwrap() > 0);
    assert_eq!(app.status(subscription_id).await, SubscriptionStatus::Cancelled);

    let status = call(&app, "CheckTransaction", json!({ "id": "rcpt-1" })).await;
    assert_eq!(status["result"]["state"], -2);
    assert_eq!(status["result"]["reason"], 5);

    let recreate = call(&app, "CreateTransaction", create_params).await;
    assert_eq!(recreate["error"]["code"], -31008);
}

#[tokio::test]
async fn test_amount_and_account_validation() {
    let (app, subscription_id) = app_with_test_plan().await;

    let short = call(
        &app,
        "CheckPerformTransaction",
        json!({ "amount": 1234400, "account": account(subscription_id) }),
    )
    .await;
    assert_eq!(short["error"]["code"], -31001);
    assert!(short.get("result").is_none());

    let foreign = call(
        &app,
        "CheckPerformTransaction",
        json!({
            "amount": 1234500,
            "account": { "user_id": USER + 1, "subscription_ids": [subscription_id] }
        }),
    )
    .await;
    assert_eq!(foreign["error"]["code"], -31050);
    assert_eq!(foreign["error"]["data"], "account");

    let missing = call(
        &app,
        "CheckPerformTransaction",
        json!({ "amount": 1234500, "account": account(999) }),
    )
    .await;
    assert_eq!(missing["error"]["code"], -31050);

    let create = call(
        &app,
        "CreateTransaction",
        json!({ "id": "rcpt-2", "time": 0, "amount": 100, "account": account(subscription_id) }),
    )
    .await;
    assert_eq!(create["error"]["code"], -31001);
    assert!(
        app.engine
            .payments()
            .payment(1)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_cancel_before_perform() {
    let (app, subscription_id) = app_with_test_plan().await;
    call(
        &app,
        "CreateTransaction",
        json!({ "id": "rcpt-3", "time": 0, "amount": 1234500, "account": account(subscription_id) }),
    )
    .await;

    let cancelled = call(
        &app,
        "CancelTransaction",
        json!({ "id": "rcpt-3", "reason": 3 }),
    )
    .await;
    assert_eq!(cancelled["result"]["state"], -1);
    assert_eq!(app.status(subscription_id).await, SubscriptionStatus::PendingPayment);

    let perform = call(&app, "PerformTransaction", json!({ "id": "rcpt-3" })).await;
    assert_eq!(perform["error"]["code"], -31008);
    assert!(app.boxes().await.is_empty());

    // Cancelling twice reports the same state.
    let again = call(
        &app,
        "CancelTransaction",
        json!({ "id": "rcpt-3", "reason": 3 }),
    )
    .await;
    assert_eq!(again["result"]["state"], -1);
}

#[tokio::test]
async fn test_create_attaches_to_payme_checkout() {
    let (app, subscription_id) = app_with_test_plan().await;
    let payment = app.checkout(&[subscription_id], PaymentProvider::Payme).await;
    assert_eq!(payment.amount, dec!(12345.00));

    let created = call(
        &app,
        "CreateTransaction",
        json!({ "id": "rcpt-4", "time": 0, "amount": 1234500, "account": account(subscription_id) }),
    )
    .await;
    assert_eq!(created["result"]["transaction"], payment.id.to_string().as_str());

    let stored = app.engine.payments().payment(payment.id).await.unwrap();
    assert_eq!(stored.payme_receipt_id.as_deref(), Some("rcpt-4"));
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_protocol_errors() {
    let (app, _) = app_with_test_plan().await;

    let unknown = call(&app, "PerformTransaction", json!({ "id": "nope" })).await;
    assert_eq!(unknown["error"]["code"], -31003);

    let method = call(&app, "ChangePassword", json!({})).await;
    assert_eq!(method["error"]["code"], -32601);
    assert_eq!(method["id"], 11);

    let params = call(&app, "CheckTransaction", json!({ "transaction": 1 })).await;
    assert_eq!(params["error"]["code"], -32600);

    let garbage = app.payme(RawCallback::new("{not json")).await;
    assert_eq!(garbage["error"]["code"], -32400);
    assert_eq!(garbage["id"], Value::Null);
}

#[tokio::test]
async fn test_signature_checked_in_production() {
    let app = TestApp::production().await;
    let (_, subscription) = app.subscribe("Ali", &[], &[], 1).await;
    let body = rpc(
        "CheckPerformTransaction",
        json!({ "amount": 35000000, "account": account(subscription.id) }),
    );

    let unsigned = app.payme(RawCallback::new(body.clone())).await;
    assert_eq!(unsigned["error"]["code"], -32504);

    let forged = app.payme(RawCallback::signed(body.clone(), "deadbeef")).await;
    assert_eq!(forged["error"]["code"], -32504);

    let signature = payme_signature(PAYME_SECRET, &body).unwrap();
    let signed = app.payme(RawCallback::signed(body, signature)).await;
    assert_eq!(signed["result"]["allow"], true);
}

#[tokio::test]
async fn test_missing_secret_fails_closed() {
    let app = TestApp::with(Settings::production(), MockGateway::always_succeeds()).await;
    let body = rpc("CheckTransaction", json!({ "id": "rcpt-1" }));
    let signature = payme_signature("anything", &body).unwrap();

    let response = app.payme(RawCallback::signed(body, signature)).await;
    assert_eq!(response["error"]["code"], -32400);
}
