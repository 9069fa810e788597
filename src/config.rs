use crate::domain::money::{AmountBounds, MAX_SUMS};
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Runtime settings. Every field is a CLI flag with an environment fallback.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Provider signatures are only verified in production
    #[arg(long, env = "ENVIRONMENT", value_enum, default_value = "development")]
    pub environment: Environment,

    #[arg(long, env = "CLICK_SERVICE_ID")]
    pub click_service_id: Option<i64>,

    #[arg(long, env = "CLICK_SECRET_KEY", hide_env_values = true)]
    pub click_secret_key: Option<String>,

    #[arg(long, env = "PAYME_SECRET_KEY", hide_env_values = true)]
    pub payme_secret_key: Option<String>,

    #[arg(long, env = "CURRENCY", default_value = "UZS")]
    pub currency: String,

    /// Smallest payment total accepted, in sums
    #[arg(long, env = "MIN_PAYMENT_AMOUNT", default_value = "1000")]
    pub min_payment_amount: Decimal,

    /// Largest payment total accepted, in sums
    #[arg(long, env = "MAX_PAYMENT_AMOUNT", default_value = "10000000")]
    pub max_payment_amount: Decimal,

    /// Days between ordering and the first delivery when no date was chosen
    #[arg(long, env = "INITIAL_DELIVERY_DAYS", default_value_t = 7)]
    pub initial_delivery_days: i64,

    /// How long a box stays with the child
    #[arg(long, env = "RENTAL_DAYS", default_value_t = 14)]
    pub rental_days: i64,

    /// Gap between a box return and the next delivery
    #[arg(long, env = "NEXT_DELIVERY_GAP_DAYS", default_value_t = 1)]
    pub next_delivery_gap_days: i64,

    /// Period a completed payment extends a subscription by
    #[arg(long, env = "SUBSCRIPTION_PERIOD_DAYS", default_value_t = 30)]
    pub subscription_period_days: i64,

    /// Simulated gateway processing time
    #[arg(long, env = "GATEWAY_LATENCY_MS", default_value_t = 0)]
    pub gateway_latency_ms: u64,

    /// Probability the mock gateway accepts a payment
    #[arg(long, env = "GATEWAY_SUCCESS_RATE", default_value_t = 0.9)]
    pub gateway_success_rate: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            click_service_id: None,
            click_secret_key: None,
            payme_secret_key: None,
            currency: "UZS".to_string(),
            min_payment_amount: dec!(1000),
            max_payment_amount: MAX_SUMS,
            initial_delivery_days: 7,
            rental_days: 14,
            next_delivery_gap_days: 1,
            subscription_period_days: 30,
            gateway_latency_ms: 0,
            gateway_success_rate: 0.9,
        }
    }
}

impl Settings {
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            ..Self::default()
        }
    }

    pub fn verifies_signatures(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn amount_bounds(&self) -> AmountBounds {
        AmountBounds {
            min: self.min_payment_amount,
            max: self.max_payment_amount.min(MAX_SUMS),
        }
    }

    pub fn gateway_latency(&self) -> Duration {
        Duration::from_millis(self.gateway_latency_ms)
    }
}
