use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::*;
use crate::error::Result;

pub mod user_repository;
pub mod listing_repository;
pub mod host_account_repository;
pub mod booking_repository;
pub mod transaction_repository;
pub mod settlement_repository;
pub mod webhook_event_repository;
pub mod reconciliation_repository;

pub use user_repository::SqliteUserRepository;
pub use listing_repository::SqliteListingRepository;
pub use host_account_repository::SqliteHostAccountRepository;
pub use booking_repository::SqliteBookingRepository;
pub use transaction_repository::SqliteTransactionRepository;
pub use settlement_repository::SqliteSettlementRepository;
pub use webhook_event_repository::SqliteWebhookEventRepository;
pub use reconciliation_repository::SqliteReconciliationRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: CreateUserRequest) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn password_hash(&self, email: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn create(&self, listing: Listing) -> Result<Listing>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Listing>>;
    async fn list_by_host(&self, host_id: Uuid) -> Result<Vec<Listing>>;
}

#[async_trait]
pub trait HostAccountRepository: Send + Sync {
    async fn create(&self, host_id: Uuid, stripe_account_id: &str) -> Result<HostAccount>;
    async fn find_by_host(&self, host_id: Uuid) -> Result<Option<HostAccount>>;
    async fn find_by_stripe_account(&self, stripe_account_id: &str) -> Result<Option<HostAccount>>;
    /// Records the capabilities the processor reported. Returns `None` when
    /// no host owns the account.
    async fn update_capabilities(
        &self,
        stripe_account_id: &str,
        charges_enabled: bool,
        payouts_enabled: bool,
    ) -> Result<Option<HostAccount>>;
}

/// Bookings. `status` is only ever written through the conditional
/// methods below; each returns `false` when the precondition no longer
/// held and nothing was written.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// `None` when the host already has this check-in code on that date.
    async fn create(&self, booking: NewBooking) -> Result<Option<Booking>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>>;
    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Booking>>;
    /// Confirmed booking for this host carrying the given check-in segment.
    async fn find_for_checkin(&self, segment: &str, host_id: Uuid) -> Result<Option<Booking>>;
    async fn list(&self, filter: &BookingFilter) -> Result<Vec<Booking>>;
    /// `pending -> confirmed`, storing the payment intent reference.
    async fn confirm(&self, id: Uuid, payment_intent_id: &str) -> Result<bool>;
    async fn transition(&self, id: Uuid, from: BookingStatus, to: BookingStatus) -> Result<bool>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create(&self, transaction: NewTransaction) -> Result<Transaction>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>>;
    async fn find_by_booking(&self, booking_id: Uuid) -> Result<Option<Transaction>>;
    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Transaction>>;
    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<bool>;
}

/// Writes that must change a booking and its ledger entry together.
#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Ledger `pending -> failed` and booking `confirmed -> cancelled`.
    async fn apply_payment_failure(&self, payment_intent_id: &str) -> Result<Settlement>;
    /// Ledger `pending|completed -> refunded` and booking `pending|confirmed -> cancelled`.
    /// An already refunded ledger takes a larger cumulative `refund_amount`.
    async fn apply_refund(
        &self,
        payment_intent_id: &str,
        refund_amount: i64,
        refund_id: Option<&str>,
    ) -> Result<Settlement>;
    /// Booking `confirmed -> cancelled` with the ledger moved to `ledger_status`.
    async fn cancel_confirmed(
        &self,
        booking_id: Uuid,
        ledger_status: TransactionStatus,
        refund_amount: Option<i64>,
        refund_id: Option<&str>,
    ) -> Result<Settlement>;
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Claims an event id for processing. `false` means it was seen before.
    async fn claim(&self, event_id: &str, event_type: &str) -> Result<bool>;
    async fn finish(&self, event_id: &str, result: &str, error_message: Option<&str>) -> Result<()>;
}

#[async_trait]
pub trait ReconciliationRepository: Send + Sync {
    async fn enqueue(
        &self,
        kind: ReconciliationKind,
        booking_id: Option<Uuid>,
        payment_intent_id: Option<&str>,
        detail: &str,
    ) -> Result<ReconciliationTask>;
    async fn list_open(&self) -> Result<Vec<ReconciliationTask>>;
    /// Resolves open tasks of `kind` for a payment intent. Returns how many were closed.
    async fn resolve_for_intent(&self, kind: ReconciliationKind, payment_intent_id: &str) -> Result<u64>;
}
