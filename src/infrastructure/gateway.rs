use crate::domain::ports::{GatewayOutcome, GatewayStatus, PaymentGateway};
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

/// Simulated third-party gateway.
///
/// Settlement sleeps for `latency` and then succeeds with probability
/// `success_rate`.
#[derive(Debug, Clone)]
pub struct MockGateway {
    latency: Duration,
    success_rate: f64,
}

impl MockGateway {
    pub fn new(latency: Duration, success_rate: f64) -> Self {
        Self {
            latency,
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }

    /// Gateway that settles immediately and always succeeds.
    pub fn always_succeeds() -> Self {
        Self::new(Duration::ZERO, 1.0)
    }

    pub fn always_fails() -> Self {
        Self::new(Duration::ZERO, 0.0)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new(Duration::ZERO, 0.9)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn register(&self, amount: Decimal, currency: &str) -> String {
        let simple = Uuid::new_v4().simple().to_string().to_uppercase();
        let external_id = format!("PAY_{}", &simple[..12]);
        tracing::debug!(%external_id, %amount, currency, "registered payment with gateway");
        external_id
    }

    async fn settle(&self, external_id: &str, amount: Decimal) -> GatewayOutcome {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let succeeded = rand::thread_rng().gen_bool(self.success_rate);
        if succeeded {
            tracing::info!(external_id, %amount, "gateway settled payment");
            GatewayOutcome {
                status: GatewayStatus::Succeeded,
                message: None,
            }
        } else {
            tracing::warn!(external_id, %amount, "gateway declined payment");
            GatewayOutcome {
                status: GatewayStatus::Failed,
                message: Some("Payment declined by gateway".to_string()),
            }
        }
    }
}
