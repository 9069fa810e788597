mod common;

use common::{TestApp, USER, click_callback};
use rust_decimal_macros::dec;
use toybox_fulfillment::config::Settings;
use toybox_fulfillment::domain::payment::{PaymentProvider, PaymentStatus};
use toybox_fulfillment::domain::ports::GatewayStatus;
use toybox_fulfillment::domain::subscription::SubscriptionStatus;
use toybox_fulfillment::error::FulfillmentError;
use toybox_fulfillment::infrastructure::gateway::MockGateway;

#[tokio::test]
async fn test_mock_checkout_activates_and_plans_box() {
    let app = TestApp::new().await;
    let (child, subscription) = app.subscribe("Ali", &["Творчество"], &[], 1).await;
    assert_eq!(app.status(subscription.id).await, SubscriptionStatus::PendingPayment);

    let payment = app.checkout(&[subscription.id], PaymentProvider::Mock).await;
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, dec!(350000));
    assert!(payment.external_id.starts_with("PAY_"));

    let payment = app.engine.payments().process(payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(app.status(subscription.id).await, SubscriptionStatus::Active);

    let boxes = app.boxes().await;
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].child_id, child.id);
    assert_eq!(boxes[0].total_items(), 6);

    // Processing a settled payment again changes nothing.
    app.engine.payments().process(payment.id).await.unwrap();
    assert_eq!(app.boxes().await.len(), 1);
}

#[tokio::test]
async fn test_one_payment_covers_siblings() {
    let app = TestApp::new().await;
    let (_, first) = app.subscribe("Ali", &[], &[], 1).await;
    let (_, second) = app.subscribe("Vali", &[], &[], 1).await;

    let payment = app
        .checkout(&[second.id, first.id, first.id], PaymentProvider::Mock)
        .await;
    assert_eq!(payment.amount, dec!(630000));

    app.engine.payments().process(payment.id).await.unwrap();
    assert_eq!(app.status(first.id).await, SubscriptionStatus::Active);
    assert_eq!(app.status(second.id).await, SubscriptionStatus::Active);
    assert_eq!(app.boxes().await.len(), 2);
}

#[tokio::test]
async fn test_failed_gateway_leaves_subscription_payable() {
    let app = TestApp::with(Settings::default(), MockGateway::always_fails()).await;
    let (_, subscription) = app.subscribe("Ali", &[], &[], 1).await;

    let payment = app.checkout(&[subscription.id], PaymentProvider::Mock).await;
    let payment = app.engine.payments().process(payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.error_message.is_some());
    assert_eq!(app.status(subscription.id).await, SubscriptionStatus::PendingPayment);
    assert!(app.boxes().await.is_empty());

    let retry = app.checkout(&[subscription.id], PaymentProvider::Mock).await;
    assert_ne!(retry.id, payment.id);
}

#[tokio::test]
async fn test_checkout_rejects_foreign_and_active_subscriptions() {
    let app = TestApp::new().await;
    let (_, subscription) = app.subscribe("Ali", &[], &[], 1).await;

    assert!(matches!(
        app.engine
            .payments()
            .checkout(USER + 1, &[subscription.id], PaymentProvider::Mock)
            .await,
        Err(FulfillmentError::ValidationError(_))
    ));
    assert!(matches!(
        app.engine
            .payments()
            .checkout(USER, &[], PaymentProvider::Mock)
            .await,
        Err(FulfillmentError::ValidationError(_))
    ));

    let payment = app.checkout(&[subscription.id], PaymentProvider::Mock).await;
    app.engine.payments().process(payment.id).await.unwrap();
    assert!(matches!(
        app.engine
            .payments()
            .checkout(USER, &[subscription.id], PaymentProvider::Mock)
            .await,
        Err(FulfillmentError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_new_checkout_supersedes_pending_one() {
    let app = TestApp::new().await;
    let (_, subscription) = app.subscribe("Ali", &[], &[], 1).await;

    let first = app.checkout(&[subscription.id], PaymentProvider::Mock).await;
    let second = app.checkout(&[subscription.id], PaymentProvider::Mock).await;

    let first = app.engine.payments().payment(first.id).await.unwrap();
    assert_eq!(first.status, PaymentStatus::Expired);
    // The expired payment cannot be revived.
    let first = app.engine.payments().process(first.id).await.unwrap();
    assert_eq!(first.status, PaymentStatus::Expired);

    app.engine.payments().process(second.id).await.unwrap();
    assert_eq!(app.status(subscription.id).await, SubscriptionStatus::Active);
}

#[tokio::test]
async fn test_click_checkout_supersedes_within_same_second() {
    let app = TestApp::new().await;
    let (_, subscription) = app.subscribe("Ali", &[], &[], 1).await;

    let first = app.checkout(&[subscription.id], PaymentProvider::Click).await;
    let second = app
        .engine
        .payments()
        .checkout(USER, &[subscription.id], PaymentProvider::Click)
        .await
        .unwrap();
    assert_ne!(first.merchant_trans_id, second.merchant_trans_id);

    let first = app.engine.payments().payment(first.id).await.unwrap();
    assert_eq!(first.status, PaymentStatus::Expired);
    assert_eq!(second.status, PaymentStatus::Pending);

    // The replacement is the one Click can settle.
    app.click(&click_callback(&second, 0)).await;
    assert_eq!(app.click(&click_callback(&second, 1)).await["error"], 0);
    assert_eq!(app.status(subscription.id).await, SubscriptionStatus::Active);
    assert_eq!(app.click(&click_callback(&first, 0)).await["error"], -9);
}

#[tokio::test]
async fn test_webhooks_drive_payment_state() {
    let app = TestApp::new().await;
    let (_, subscription) = app.subscribe("Ali", &[], &[], 1).await;
    let payment = app.checkout(&[subscription.id], PaymentProvider::Mock).await;
    let payments = app.engine.payments();

    let settled = payments
        .handle_gateway_webhook(&payment.external_id, GatewayStatus::Succeeded)
        .await
        .unwrap();
    assert_eq!(settled.status, PaymentStatus::Completed);

    // Late failure notice for a completed payment is ignored.
    let ignored = payments
        .handle_gateway_webhook(&payment.external_id, GatewayStatus::Failed)
        .await
        .unwrap();
    assert_eq!(ignored.status, PaymentStatus::Completed);
    assert_eq!(app.boxes().await.len(), 1);

    let refunded = payments
        .handle_gateway_webhook(&payment.external_id, GatewayStatus::Refunded)
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(app.status(subscription.id).await, SubscriptionStatus::Cancelled);

    assert!(matches!(
        payments
            .handle_gateway_webhook("PAY_UNKNOWN", GatewayStatus::Succeeded)
            .await,
        Err(FulfillmentError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_refund_requires_completed_payment() {
    let app = TestApp::new().await;
    let (_, subscription) = app.subscribe("Ali", &[], &[], 1).await;
    let payment = app.checkout(&[subscription.id], PaymentProvider::Mock).await;

    assert!(matches!(
        app.engine.payments().refund(payment.id, "changed mind").await,
        Err(FulfillmentError::InvalidState(_))
    ));

    app.engine.payments().process(payment.id).await.unwrap();
    let refunded = app
        .engine
        .payments()
        .refund(payment.id, "changed mind")
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(refunded.error_message.as_deref(), Some("changed mind"));
}

#[tokio::test]
async fn test_standalone_payment_bounds() {
    let app = TestApp::new().await;
    let payments = app.engine.payments();

    let payment = payments.create_payment(USER, dec!(1000), "UZS").await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(matches!(
        payments.create_payment(USER, dec!(999.99), "UZS").await,
        Err(FulfillmentError::ValidationError(_))
    ));
    assert!(matches!(
        payments.create_payment(USER, dec!(10000000.01), "UZS").await,
        Err(FulfillmentError::ValidationError(_))
    ));
}
