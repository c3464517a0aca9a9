use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{AppError, Result};

pub mod orchestrator;
pub mod stripe_client;
pub mod webhook;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

pub use orchestrator::{calculate_fees, PaymentOrchestrator};
pub use stripe_client::StripeGateway;
pub use webhook::{GatewayEvent, WebhookEvent, WebhookVerifier};
#[cfg(any(test, feature = "test-utils"))]
pub use fake::{FakeStripeGateway, IntentPause};

/// A payment intent with a destination transfer to a host's connected account.
#[derive(Debug, Clone)]
pub struct PaymentIntentRequest {
    pub amount: i64,
    pub destination_account: String,
    pub destination_amount: i64,
    pub metadata: HashMap<String, String>,
    /// Repeating a request with the same key returns the original intent.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentRef {
    pub id: String,
    pub client_secret: Option<String>,
}

/// The payment processor as seen by the booking core. The platform never
/// holds funds; every money movement is delegated here.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_connected_account(&self, email: &str) -> Result<String>;

    async fn create_onboarding_link(
        &self,
        account_ref: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<String>;

    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntentRef>;

    async fn payment_intent_client_secret(&self, intent_ref: &str) -> Result<String>;

    /// Cancels an intent that has not been paid yet.
    async fn cancel_payment_intent(&self, intent_ref: &str) -> Result<()>;

    /// Refunds `amount` (everything when `None`) and reverses the host transfer.
    async fn refund(&self, intent_ref: &str, amount: Option<i64>) -> Result<String>;
}

/// Stand-in used when Stripe is not configured; every call fails.
pub struct DisabledGateway;

impl DisabledGateway {
    fn unavailable<T>() -> Result<T> {
        Err(AppError::PaymentGateway("Payment processing is disabled".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_connected_account(&self, _email: &str) -> Result<String> {
        Self::unavailable()
    }

    async fn create_onboarding_link(&self, _: &str, _: &str, _: &str) -> Result<String> {
        Self::unavailable()
    }

    async fn create_payment_intent(&self, _request: PaymentIntentRequest) -> Result<PaymentIntentRef> {
        Self::unavailable()
    }

    async fn payment_intent_client_secret(&self, _intent_ref: &str) -> Result<String> {
        Self::unavailable()
    }

    async fn cancel_payment_intent(&self, _intent_ref: &str) -> Result<()> {
        Self::unavailable()
    }

    async fn refund(&self, _intent_ref: &str, _amount: Option<i64>) -> Result<String> {
        Self::unavailable()
    }
}
