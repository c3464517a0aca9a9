use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::Fees,
    error::{AppError, Result},
    payments::{PaymentGateway, PaymentIntentRef, PaymentIntentRequest},
};

const BPS_DENOMINATOR: i64 = 10_000;

/// Splits `gross` into platform fee and host payout.
///
/// The fee is `gross * rate` rounded half up in whole minor units; the
/// payout is the remainder, so the two always add back to `gross`.
pub fn calculate_fees(gross: i64, fee_rate_bps: i64) -> Result<Fees> {
    if gross < 0 {
        return Err(AppError::InvalidInput("Amount cannot be negative".to_string()));
    }
    if !(0..=BPS_DENOMINATOR).contains(&fee_rate_bps) {
        return Err(AppError::Internal(format!("Fee rate out of range: {} bps", fee_rate_bps)));
    }

    let platform_fee = gross
        .checked_mul(fee_rate_bps)
        .and_then(|scaled| scaled.checked_add(BPS_DENOMINATOR / 2))
        .map(|scaled| scaled / BPS_DENOMINATOR)
        .ok_or_else(|| AppError::InvalidInput(format!("Amount out of range: {}", gross)))?;

    Ok(Fees {
        platform_fee,
        host_payout: gross - platform_fee,
    })
}

/// Fee calculation plus the money-moving calls the booking lifecycle makes
/// against the gateway.
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    fee_rate_bps: i64,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, fee_rate_bps: i64) -> Self {
        Self { gateway, fee_rate_bps }
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    pub fn calculate_fees(&self, gross: i64) -> Result<Fees> {
        calculate_fees(gross, self.fee_rate_bps)
    }

    /// Creates the guest-facing intent for a booking. The host's connected
    /// account receives `gross - fee`; booking id and fee travel as
    /// metadata for reconciliation.
    pub async fn create_payment_intent(
        &self,
        gross: i64,
        host_account_ref: &str,
        booking_id: Uuid,
    ) -> Result<(PaymentIntentRef, Fees)> {
        let fees = self.calculate_fees(gross)?;

        let mut metadata = HashMap::new();
        metadata.insert("booking_id".to_string(), booking_id.to_string());
        metadata.insert("platform_fee".to_string(), fees.platform_fee.to_string());
        metadata.insert("host_payout".to_string(), fees.host_payout.to_string());

        let request = PaymentIntentRequest {
            amount: gross,
            destination_account: host_account_ref.to_string(),
            destination_amount: fees.host_payout,
            metadata,
            idempotency_key: format!("accept-{}", booking_id),
        };

        let intent = self.gateway.create_payment_intent(request).await?;

        tracing::info!(
            booking_id = %booking_id,
            payment_intent_id = %intent.id,
            gross,
            platform_fee = fees.platform_fee,
            host_payout = fees.host_payout,
            "Created payment intent"
        );

        Ok((intent, fees))
    }

    /// Refunds a captured intent. `None` refunds in full; the host transfer
    /// is always reversed by the gateway.
    pub async fn refund(&self, intent_ref: &str, amount: Option<i64>) -> Result<String> {
        if let Some(amount) = amount {
            if amount <= 0 {
                return Err(AppError::InvalidInput("Refund amount must be positive".to_string()));
            }
        }

        let refund_id = self.gateway.refund(intent_ref, amount).await?;

        tracing::info!(
            payment_intent_id = %intent_ref,
            refund_id = %refund_id,
            amount = ?amount,
            "Issued refund"
        );

        Ok(refund_id)
    }

    pub async fn cancel_payment_intent(&self, intent_ref: &str) -> Result<()> {
        self.gateway.cancel_payment_intent(intent_ref).await?;
        tracing::info!(payment_intent_id = %intent_ref, "Cancelled payment intent");
        Ok(())
    }

    pub async fn client_secret(&self, intent_ref: &str) -> Result<String> {
        self.gateway.payment_intent_client_secret(intent_ref).await
    }
}
