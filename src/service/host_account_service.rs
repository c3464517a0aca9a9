use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::{HostAccount, User},
    error::{AppError, Result},
    payments::PaymentOrchestrator,
    service::Repositories,
};

/// Connected-account onboarding for hosts. Capability flags are only ever
/// set by the reconciler from `account.updated` events.
pub struct HostAccountService {
    repos: Repositories,
    payments: Arc<PaymentOrchestrator>,
    base_url: String,
}

impl HostAccountService {
    pub fn new(repos: Repositories, payments: Arc<PaymentOrchestrator>, base_url: String) -> Self {
        Self {
            repos,
            payments,
            base_url,
        }
    }

    /// Returns the host's account, creating an unverified one on first call.
    pub async fn create_account(&self, host: &User) -> Result<HostAccount> {
        if let Some(existing) = self.repos.host_accounts.find_by_host(host.id).await? {
            return Ok(existing);
        }

        let account_ref = self
            .payments
            .gateway()
            .create_connected_account(&host.email)
            .await?;

        match self.repos.host_accounts.create(host.id, &account_ref).await {
            Ok(account) => {
                tracing::info!(host_id = %host.id, stripe_account_id = %account_ref, "Created host payment account");
                Ok(account)
            }
            Err(AppError::Conflict(_)) => {
                tracing::warn!(
                    host_id = %host.id,
                    stripe_account_id = %account_ref,
                    "Concurrent account creation; keeping the stored account"
                );
                self.status(host.id)
                    .await?
                    .ok_or_else(|| AppError::Internal("Host account vanished after conflict".to_string()))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn onboarding_link(&self, host_id: Uuid) -> Result<String> {
        let account = self
            .status(host_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Create a payment account first".to_string()))?;

        let base = self.base_url.trim_end_matches('/');
        self.payments
            .gateway()
            .create_onboarding_link(
                &account.stripe_account_id,
                &format!("{}/host/payments?onboarding=complete", base),
                &format!("{}/host/payments?onboarding=refresh", base),
            )
            .await
    }

    pub async fn status(&self, host_id: Uuid) -> Result<Option<HostAccount>> {
        self.repos.host_accounts.find_by_host(host_id).await
    }
}
