use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::*,
    error::{AppError, Result},
    payments::{GatewayEvent, PaymentOrchestrator, WebhookEvent},
    service::Repositories,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Local state changed.
    Applied,
    /// The event id was processed before; nothing was done.
    Duplicate,
    /// Valid but nothing to change (unhandled type, stale or unknown reference).
    Ignored,
    /// Processing failed after the event was claimed. Recorded, not retried.
    Failed(String),
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::Ignored => "ignored",
            ReconcileOutcome::Failed(_) => "error",
        }
    }
}

/// Applies verified gateway events to bookings, the ledger and host
/// accounts. Each event id is processed at most once.
pub struct WebhookReconciler {
    repos: Repositories,
    payments: Arc<PaymentOrchestrator>,
}

impl WebhookReconciler {
    pub fn new(repos: Repositories, payments: Arc<PaymentOrchestrator>) -> Self {
        Self { repos, payments }
    }

    /// Only fails when the idempotency ledger itself is unreachable, in
    /// which case the gateway should retry.
    pub async fn reconcile(&self, event: &WebhookEvent) -> Result<ReconcileOutcome> {
        if !self
            .repos
            .webhook_events
            .claim(&event.id, &event.event_type)
            .await?
        {
            tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook event");
            return Ok(ReconcileOutcome::Duplicate);
        }

        let result = match event.kind() {
            Ok(kind) => self.apply(kind).await,
            Err(err) => Err(err),
        };

        let (outcome, error_message) = match result {
            Ok(true) => (ReconcileOutcome::Applied, None),
            Ok(false) => (ReconcileOutcome::Ignored, None),
            Err(err) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "Webhook processing failed"
                );
                let message = err.to_string();
                (ReconcileOutcome::Failed(message.clone()), Some(message))
            }
        };
        let label = outcome.as_str();

        if let Err(err) = self
            .repos
            .webhook_events
            .finish(&event.id, label, error_message.as_deref())
            .await
        {
            tracing::error!(event_id = %event.id, error = %err, "Could not record webhook result");
        }

        tracing::info!(event_id = %event.id, event_type = %event.event_type, result = label, "Webhook processed");
        Ok(outcome)
    }

    async fn apply(&self, event: GatewayEvent) -> Result<bool> {
        match event {
            GatewayEvent::PaymentSucceeded {
                payment_intent_id,
                amount,
                metadata,
            } => self.payment_succeeded(&payment_intent_id, amount, &metadata).await,
            GatewayEvent::PaymentFailed {
                payment_intent_id,
                reason,
            } => self.payment_failed(&payment_intent_id, reason.as_deref()).await,
            GatewayEvent::AccountUpdated {
                account_id,
                charges_enabled,
                payouts_enabled,
            } => self.account_updated(&account_id, charges_enabled, payouts_enabled).await,
            GatewayEvent::ChargeRefunded {
                charge_id,
                payment_intent_id,
                amount_refunded,
                refund_id,
            } => match payment_intent_id {
                Some(intent) => {
                    self.charge_refunded(&intent, amount_refunded, refund_id.as_deref())
                        .await
                }
                None => {
                    tracing::warn!(charge_id = %charge_id, "Refunded charge has no payment intent");
                    Ok(false)
                }
            },
            GatewayEvent::Unhandled(event_type) => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event type");
                Ok(false)
            }
        }
    }

    async fn payment_succeeded(
        &self,
        intent_id: &str,
        amount: i64,
        metadata: &HashMap<String, String>,
    ) -> Result<bool> {
        let Some(entry) = self.repos.transactions.find_by_payment_intent(intent_id).await? else {
            return self.rebuild_ledger(intent_id, amount, metadata).await;
        };

        match entry.status {
            TransactionStatus::Pending => {
                self.repos
                    .transactions
                    .transition(entry.id, TransactionStatus::Pending, TransactionStatus::Completed)
                    .await
            }
            TransactionStatus::Failed => {
                // Captured after the booking was already cancelled.
                let moved = self
                    .repos
                    .transactions
                    .transition(entry.id, TransactionStatus::Failed, TransactionStatus::Completed)
                    .await?;
                if moved {
                    self.flag(
                        ReconciliationKind::CapturedOnCancelledBooking,
                        Some(entry.booking_id),
                        intent_id,
                        &format!("captured {} after the booking was cancelled", amount),
                    )
                    .await;
                }
                Ok(moved)
            }
            TransactionStatus::Completed | TransactionStatus::Refunded => Ok(false),
        }
    }

    /// The accept path confirmed the booking but never wrote its ledger entry.
    async fn rebuild_ledger(
        &self,
        intent_id: &str,
        amount: i64,
        metadata: &HashMap<String, String>,
    ) -> Result<bool> {
        let Some(booking) = self.repos.bookings.find_by_payment_intent(intent_id).await? else {
            let claimed_booking = metadata
                .get("booking_id")
                .and_then(|id| Uuid::parse_str(id).ok());
            if let Some(booking_id) = claimed_booking {
                if self.repos.bookings.find_by_id(booking_id).await?.is_some() {
                    self.flag(
                        ReconciliationKind::CapturedOnCancelledBooking,
                        Some(booking_id),
                        intent_id,
                        "payment captured for an intent the booking never recorded",
                    )
                    .await;
                    return Ok(true);
                }
            }
            tracing::warn!(payment_intent_id = %intent_id, "Payment succeeded for unknown intent");
            return Ok(false);
        };

        let fees = fees_from_metadata(metadata, amount)
            .map(Ok)
            .unwrap_or_else(|| self.payments.calculate_fees(amount))?;

        let created = self
            .repos
            .transactions
            .create(NewTransaction {
                booking_id: booking.id,
                gross_amount: amount,
                platform_fee: fees.platform_fee,
                host_payout: fees.host_payout,
                payment_intent_id: intent_id.to_string(),
                status: TransactionStatus::Completed,
            })
            .await;

        match created {
            Ok(entry) => {
                tracing::warn!(
                    booking_id = %booking.id,
                    transaction_id = %entry.id,
                    payment_intent_id = %intent_id,
                    "Rebuilt missing ledger entry from payment event"
                );
            }
            Err(AppError::Conflict(_)) => return Ok(false),
            Err(err) => return Err(err),
        }

        let resolved = self
            .repos
            .reconciliation
            .resolve_for_intent(ReconciliationKind::LedgerWriteFailed, intent_id)
            .await?;
        if resolved > 0 {
            tracing::info!(payment_intent_id = %intent_id, resolved, "Resolved ledger repair tasks");
        }

        if booking.status == BookingStatus::Cancelled {
            self.flag(
                ReconciliationKind::CapturedOnCancelledBooking,
                Some(booking.id),
                intent_id,
                &format!("captured {} after the booking was cancelled", amount),
            )
            .await;
        }

        Ok(true)
    }

    async fn payment_failed(&self, intent_id: &str, reason: Option<&str>) -> Result<bool> {
        let settlement = self.repos.settlements.apply_payment_failure(intent_id).await?;

        if settlement.ledger_updated || settlement.booking_cancelled {
            tracing::info!(
                payment_intent_id = %intent_id,
                reason = ?reason,
                booking_cancelled = settlement.booking_cancelled,
                "Payment failed; booking cancelled"
            );
            return Ok(true);
        }

        tracing::info!(payment_intent_id = %intent_id, reason = ?reason, "Late payment failure ignored");
        Ok(false)
    }

    async fn account_updated(&self, account_id: &str, charges_enabled: bool, payouts_enabled: bool) -> Result<bool> {
        match self
            .repos
            .host_accounts
            .update_capabilities(account_id, charges_enabled, payouts_enabled)
            .await?
        {
            Some(account) => {
                tracing::info!(
                    host_id = %account.host_id,
                    stripe_account_id = %account_id,
                    verified = account.verified,
                    "Host account capabilities updated"
                );
                Ok(true)
            }
            None => {
                tracing::warn!(stripe_account_id = %account_id, "Update for unknown connected account");
                Ok(false)
            }
        }
    }

    async fn charge_refunded(&self, intent_id: &str, amount_refunded: i64, refund_id: Option<&str>) -> Result<bool> {
        let settlement = self
            .repos
            .settlements
            .apply_refund(intent_id, amount_refunded, refund_id)
            .await?;

        if settlement.booking_cancelled {
            self.repos
                .reconciliation
                .resolve_for_intent(ReconciliationKind::CancellationWriteFailed, intent_id)
                .await?;
        } else if let Some(booking) = self.repos.bookings.find_by_payment_intent(intent_id).await? {
            if matches!(booking.status, BookingStatus::InProgress | BookingStatus::Completed)
                && settlement.ledger_updated
            {
                self.flag(
                    ReconciliationKind::RefundOnActiveBooking,
                    Some(booking.id),
                    intent_id,
                    &format!("refunded {} on a {} booking", amount_refunded, booking.status),
                )
                .await;
            }
        }

        tracing::info!(
            payment_intent_id = %intent_id,
            amount_refunded,
            ledger_updated = settlement.ledger_updated,
            booking_cancelled = settlement.booking_cancelled,
            "Refund reconciled"
        );

        Ok(settlement.ledger_updated || settlement.booking_cancelled)
    }

    async fn flag(&self, kind: ReconciliationKind, booking_id: Option<Uuid>, intent_id: &str, detail: &str) {
        tracing::error!(
            alarm = kind.as_str(),
            booking_id = ?booking_id,
            payment_intent_id = %intent_id,
            detail,
            "Payment state needs manual reconciliation"
        );

        if let Err(err) = self
            .repos
            .reconciliation
            .enqueue(kind, booking_id, Some(intent_id), detail)
            .await
        {
            tracing::error!(
                alarm = "reconciliation_enqueue_failed",
                payment_intent_id = %intent_id,
                error = %err,
                "Could not queue reconciliation task"
            );
        }
    }
}

/// Fee split as recorded on the intent, if present and consistent.
fn fees_from_metadata(metadata: &HashMap<String, String>, gross: i64) -> Option<Fees> {
    let platform_fee = metadata.get("platform_fee")?.parse().ok()?;
    let host_payout = metadata.get("host_payout")?.parse().ok()?;
    let fees = Fees {
        platform_fee,
        host_payout,
    };
    (fees.gross() == gross).then_some(fees)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(fee: &str, payout: &str) -> HashMap<String, String> {
        HashMap::from([
            ("platform_fee".to_string(), fee.to_string()),
            ("host_payout".to_string(), payout.to_string()),
        ])
    }

    #[test]
    fn test_metadata_fees_used_when_consistent() {
        assert_eq!(
            fees_from_metadata(&metadata("225", "1275"), 1500),
            Some(Fees { platform_fee: 225, host_payout: 1275 })
        );
    }

    #[test]
    fn test_metadata_fees_rejected_when_inconsistent() {
        assert_eq!(fees_from_metadata(&metadata("225", "1275"), 1000), None);
        assert_eq!(fees_from_metadata(&metadata("x", "1275"), 1500), None);
        assert_eq!(fees_from_metadata(&HashMap::new(), 1500), None);
    }
}
