use async_trait::async_trait;
use stripe::{
    Account, AccountId, AccountLink, AccountLinkType, AccountType, CancelPaymentIntent, Client,
    CreateAccount, CreateAccountCapabilities, CreateAccountCapabilitiesCardPayments,
    CreateAccountCapabilitiesTransfers, CreateAccountLink, CreatePaymentIntent,
    CreatePaymentIntentAutomaticPaymentMethods, CreatePaymentIntentTransferData, CreateRefund,
    Currency, PaymentIntent, PaymentIntentId, Refund, RequestStrategy,
};

use crate::{
    error::{AppError, Result},
    payments::{PaymentGateway, PaymentIntentRef, PaymentIntentRequest},
};

/// Stripe Connect implementation of [`PaymentGateway`]. Charges are made on
/// the platform account with a destination transfer to the host.
pub struct StripeGateway {
    client: Client,
    currency: Currency,
}

impl StripeGateway {
    pub fn new(api_key: String, currency: &str) -> Self {
        let currency = currency.to_lowercase().parse::<Currency>().unwrap_or_else(|_| {
            tracing::warn!("Unknown currency {:?}, falling back to JPY", currency);
            Currency::JPY
        });

        Self {
            client: Client::new(api_key),
            currency,
        }
    }

    fn intent_id(intent_ref: &str) -> Result<PaymentIntentId> {
        intent_ref
            .parse::<PaymentIntentId>()
            .map_err(|e| AppError::PaymentGateway(format!("Invalid payment intent id {}: {}", intent_ref, e)))
    }
}

fn stripe_error(context: &str, err: stripe::StripeError) -> AppError {
    AppError::PaymentGateway(format!("{}: {}", context, err))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_connected_account(&self, email: &str) -> Result<String> {
        let mut params = CreateAccount::new();
        params.type_ = Some(AccountType::Express);
        params.email = Some(email);
        params.capabilities = Some(CreateAccountCapabilities {
            card_payments: Some(CreateAccountCapabilitiesCardPayments {
                requested: Some(true),
            }),
            transfers: Some(CreateAccountCapabilitiesTransfers {
                requested: Some(true),
            }),
            ..Default::default()
        });

        let account = Account::create(&self.client, params)
            .await
            .map_err(|e| stripe_error("Stripe account creation failed", e))?;

        Ok(account.id.to_string())
    }

    async fn create_onboarding_link(
        &self,
        account_ref: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<String> {
        let account_id = account_ref
            .parse::<AccountId>()
            .map_err(|e| AppError::PaymentGateway(format!("Invalid account id {}: {}", account_ref, e)))?;

        let mut params = CreateAccountLink::new(account_id, AccountLinkType::AccountOnboarding);
        params.return_url = Some(return_url);
        params.refresh_url = Some(refresh_url);

        let link = AccountLink::create(&self.client, params)
            .await
            .map_err(|e| stripe_error("Stripe account link failed", e))?;

        Ok(link.url)
    }

    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntentRef> {
        // Same key, same intent: a retried or concurrent accept cannot
        // produce a second charge.
        let client = self
            .client
            .clone()
            .with_strategy(RequestStrategy::Idempotent(request.idempotency_key.clone()));

        let mut params = CreatePaymentIntent::new(request.amount, self.currency);
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            allow_redirects: None,
        });
        params.transfer_data = Some(CreatePaymentIntentTransferData {
            amount: Some(request.destination_amount),
            destination: request.destination_account.clone(),
        });
        params.metadata = Some(request.metadata.clone());

        let intent = PaymentIntent::create(&client, params)
            .await
            .map_err(|e| stripe_error("Stripe payment intent failed", e))?;

        Ok(PaymentIntentRef {
            id: intent.id.to_string(),
            client_secret: intent.client_secret,
        })
    }

    async fn payment_intent_client_secret(&self, intent_ref: &str) -> Result<String> {
        let id = Self::intent_id(intent_ref)?;

        let intent = PaymentIntent::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| stripe_error("Stripe payment intent lookup failed", e))?;

        intent
            .client_secret
            .ok_or_else(|| AppError::PaymentGateway("No client secret returned".to_string()))
    }

    async fn cancel_payment_intent(&self, intent_ref: &str) -> Result<()> {
        let id = Self::intent_id(intent_ref)?;

        PaymentIntent::cancel(&self.client, &id, CancelPaymentIntent::default())
            .await
            .map_err(|e| stripe_error("Stripe payment intent cancel failed", e))?;

        Ok(())
    }

    async fn refund(&self, intent_ref: &str, amount: Option<i64>) -> Result<String> {
        let id = Self::intent_id(intent_ref)?;

        let mut params = CreateRefund::new();
        params.payment_intent = Some(id);
        params.amount = amount;
        params.reverse_transfer = Some(true);

        let refund = Refund::create(&self.client, params)
            .await
            .map_err(|e| stripe_error("Stripe refund failed", e))?;

        Ok(refund.id.to_string())
    }
}
