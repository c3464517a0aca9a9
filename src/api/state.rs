use std::sync::Arc;

use crate::{config::Settings, payments::WebhookVerifier, service::ServiceContext};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
    /// `None` when no webhook secret is configured; webhooks are then refused.
    pub webhook_verifier: Option<Arc<WebhookVerifier>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        service_context: Arc<ServiceContext>,
        webhook_verifier: Option<Arc<WebhookVerifier>>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            service_context,
            webhook_verifier,
            settings,
        }
    }
}
