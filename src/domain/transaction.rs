use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger entry for an accepted booking. Amounts are whole minor units;
/// `platform_fee + host_payout == gross_amount` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub gross_amount: i64,
    pub platform_fee: i64,
    pub host_payout: i64,
    pub payment_intent_id: String,
    pub status: TransactionStatus,
    pub refund_amount: Option<i64>,
    pub refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "refunded" => Some(TransactionStatus::Refunded),
            _ => None,
        }
    }

    /// Ledger transitions driven by the payment processor. `Completed` and
    /// `Refunded` absorb late conflicting events. `Failed -> Completed` is
    /// kept because a capture that really happened must be recorded.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Refunded)
                | (Completed, Refunded)
                | (Failed, Completed)
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub booking_id: Uuid,
    pub gross_amount: i64,
    pub platform_fee: i64,
    pub host_payout: i64,
    pub payment_intent_id: String,
    pub status: TransactionStatus,
}

/// Platform/host split of a gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    pub platform_fee: i64,
    pub host_payout: i64,
}

impl Fees {
    pub fn gross(&self) -> i64 {
        self.platform_fee + self.host_payout
    }
}

/// What a combined booking/ledger write actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settlement {
    pub ledger_updated: bool,
    pub booking_cancelled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// A payment intent exists at the gateway with no ledger entry.
    LedgerWriteFailed,
    /// Money was captured for a booking that is already cancelled.
    CapturedOnCancelledBooking,
    /// A refund settled for a booking that could no longer be cancelled.
    RefundOnActiveBooking,
    /// A refund succeeded at the gateway but the local cancellation did not apply.
    CancellationWriteFailed,
}

impl ReconciliationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationKind::LedgerWriteFailed => "ledger_write_failed",
            ReconciliationKind::CapturedOnCancelledBooking => "captured_on_cancelled_booking",
            ReconciliationKind::RefundOnActiveBooking => "refund_on_active_booking",
            ReconciliationKind::CancellationWriteFailed => "cancellation_write_failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ledger_write_failed" => Some(ReconciliationKind::LedgerWriteFailed),
            "captured_on_cancelled_booking" => Some(ReconciliationKind::CapturedOnCancelledBooking),
            "refund_on_active_booking" => Some(ReconciliationKind::RefundOnActiveBooking),
            "cancellation_write_failed" => Some(ReconciliationKind::CancellationWriteFailed),
            _ => None,
        }
    }
}

/// An external side effect that has no matching local record yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationTask {
    pub id: Uuid,
    pub kind: ReconciliationKind,
    pub booking_id: Option<Uuid>,
    pub payment_intent_id: Option<String>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus::*;

    #[test]
    fn test_settled_states_absorb_failures() {
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Refunded.can_transition_to(Failed));
        assert!(!Refunded.can_transition_to(Completed));
    }

    #[test]
    fn test_capture_after_failure_is_recorded() {
        assert!(Failed.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Refunded));
    }
}
