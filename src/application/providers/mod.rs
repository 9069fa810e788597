//! Provider callback adapters.
//!
//! Each adapter receives a provider's raw callback and always answers in that
//! provider's own envelope. Errors never escape as `FulfillmentError`.

pub mod click;
pub mod payme;

use crate::domain::payment::PaymentProvider;
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A callback exactly as the provider delivered it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCallback {
    pub body: String,
    /// Signature header value, if the provider sent one.
    pub signature: Option<String>,
}

impl RawCallback {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            signature: None,
        }
    }

    pub fn signed(body: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            signature: Some(signature.into()),
        }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Handles one callback and returns the provider-shaped response.
    async fn handle(&self, callback: RawCallback) -> serde_json::Value;
}

pub type ProviderAdapterRef = Arc<dyn ProviderAdapter>;

/// Routes callbacks to the adapter registered for their provider.
#[derive(Clone, Default)]
pub struct CallbackRouter {
    adapters: HashMap<PaymentProvider, ProviderAdapterRef>,
}

impl CallbackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: ProviderAdapterRef) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub async fn dispatch(
        &self,
        provider: PaymentProvider,
        callback: RawCallback,
    ) -> Result<serde_json::Value> {
        let adapter = self
            .adapters
            .get(&provider)
            .ok_or_else(|| FulfillmentError::not_found("callback adapter", provider))?;
        Ok(adapter.handle(callback).await)
    }
}
