use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    error::{AppError, Result},
    payments::{PaymentGateway, PaymentIntentRef, PaymentIntentRequest},
};

#[derive(Default)]
struct FakeState {
    next_id: u64,
    accounts: Vec<String>,
    intents_by_key: HashMap<String, PaymentIntentRef>,
    intent_requests: Vec<PaymentIntentRequest>,
    cancelled: Vec<String>,
    refunds: Vec<(String, Option<i64>)>,
    fail_payment_intents: bool,
    fail_refunds: bool,
    intent_pause: Option<Arc<IntentPause>>,
}

/// Holds `create_payment_intent` after the intent exists, so a test can
/// act while the caller is still waiting on the gateway.
#[derive(Default)]
pub struct IntentPause {
    created: Notify,
    release: Notify,
}

impl IntentPause {
    pub async fn created(&self) {
        self.created.notified().await
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// In-memory gateway for tests. Honours idempotency keys the way Stripe
/// does and records every call so tests can assert on side effects.
#[derive(Default)]
pub struct FakeStripeGateway {
    state: Mutex<FakeState>,
}

impl FakeStripeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_payment_intents(&self, fail: bool) {
        self.state().fail_payment_intents = fail;
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.state().fail_refunds = fail;
    }

    pub fn pause_payment_intents(&self) -> Arc<IntentPause> {
        let pause = Arc::new(IntentPause::default());
        self.state().intent_pause = Some(pause.clone());
        pause
    }

    /// Number of distinct intents created (idempotent replays not counted).
    pub fn payment_intent_count(&self) -> usize {
        self.state().intents_by_key.len()
    }

    pub fn payment_intent_requests(&self) -> Vec<PaymentIntentRequest> {
        self.state().intent_requests.clone()
    }

    pub fn last_payment_intent_request(&self) -> Option<PaymentIntentRequest> {
        self.state().intent_requests.last().cloned()
    }

    pub fn intent_for_key(&self, key: &str) -> Option<PaymentIntentRef> {
        self.state().intents_by_key.get(key).cloned()
    }

    pub fn cancelled_intents(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }

    pub fn refunds(&self) -> Vec<(String, Option<i64>)> {
        self.state().refunds.clone()
    }

    pub fn accounts(&self) -> Vec<String> {
        self.state().accounts.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeStripeGateway {
    async fn create_connected_account(&self, _email: &str) -> Result<String> {
        let mut state = self.state();
        state.next_id += 1;
        let account = format!("acct_fake_{}", state.next_id);
        state.accounts.push(account.clone());
        Ok(account)
    }

    async fn create_onboarding_link(
        &self,
        account_ref: &str,
        _return_url: &str,
        _refresh_url: &str,
    ) -> Result<String> {
        Ok(format!("https://connect.stripe.test/setup/{}", account_ref))
    }

    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntentRef> {
        let (intent, pause) = {
            let mut state = self.state();
            if state.fail_payment_intents {
                return Err(AppError::PaymentGateway("card_declined (fake)".to_string()));
            }

            state.intent_requests.push(request.clone());
            let existing = state.intents_by_key.get(&request.idempotency_key).cloned();
            let intent = match existing {
                Some(existing) => existing,
                None => {
                    state.next_id += 1;
                    let id = format!("pi_fake_{}", state.next_id);
                    let intent = PaymentIntentRef {
                        client_secret: Some(format!("{}_secret_fake", id)),
                        id,
                    };
                    state.intents_by_key.insert(request.idempotency_key, intent.clone());
                    intent
                }
            };
            (intent, state.intent_pause.take())
        };

        if let Some(pause) = pause {
            pause.created.notify_one();
            pause.release.notified().await;
        }
        Ok(intent)
    }

    async fn payment_intent_client_secret(&self, intent_ref: &str) -> Result<String> {
        self.state()
            .intents_by_key
            .values()
            .find(|intent| intent.id == intent_ref)
            .and_then(|intent| intent.client_secret.clone())
            .ok_or_else(|| AppError::PaymentGateway(format!("No such payment intent: {}", intent_ref)))
    }

    async fn cancel_payment_intent(&self, intent_ref: &str) -> Result<()> {
        self.state().cancelled.push(intent_ref.to_string());
        Ok(())
    }

    async fn refund(&self, intent_ref: &str, amount: Option<i64>) -> Result<String> {
        let mut state = self.state();
        if state.fail_refunds {
            return Err(AppError::PaymentGateway("refund failed (fake)".to_string()));
        }

        state.refunds.push((intent_ref.to_string(), amount));
        Ok(format!("re_fake_{}", state.refunds.len()))
    }
}
