pub mod booking_service;
pub mod checkin_service;
pub mod host_account_service;
pub mod webhook_service;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::AuthService;
use crate::config::Settings;
use crate::payments::{PaymentGateway, PaymentOrchestrator};
use crate::repository::*;

pub use booking_service::BookingService;
pub use checkin_service::CheckinService;
pub use host_account_service::HostAccountService;
pub use webhook_service::{ReconcileOutcome, WebhookReconciler};

/// Every store the services talk to, behind their traits.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub listings: Arc<dyn ListingRepository>,
    pub host_accounts: Arc<dyn HostAccountRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub settlements: Arc<dyn SettlementRepository>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub reconciliation: Arc<dyn ReconciliationRepository>,
}

impl Repositories {
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            users: Arc::new(SqliteUserRepository::new(pool.clone())),
            listings: Arc::new(SqliteListingRepository::new(pool.clone())),
            host_accounts: Arc::new(SqliteHostAccountRepository::new(pool.clone())),
            bookings: Arc::new(SqliteBookingRepository::new(pool.clone())),
            transactions: Arc::new(SqliteTransactionRepository::new(pool.clone())),
            settlements: Arc::new(SqliteSettlementRepository::new(pool.clone())),
            webhook_events: Arc::new(SqliteWebhookEventRepository::new(pool.clone())),
            reconciliation: Arc::new(SqliteReconciliationRepository::new(pool)),
        }
    }
}

pub struct ServiceContext {
    pub repos: Repositories,
    pub auth_service: Arc<AuthService>,
    pub booking_service: Arc<BookingService>,
    pub checkin_service: Arc<CheckinService>,
    pub host_account_service: Arc<HostAccountService>,
    pub webhook_reconciler: Arc<WebhookReconciler>,
    pub payments: Arc<PaymentOrchestrator>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(pool: SqlitePool, gateway: Arc<dyn PaymentGateway>, settings: &Settings) -> Self {
        let repos = Repositories::sqlite(pool.clone());
        let payments = Arc::new(PaymentOrchestrator::new(gateway, settings.booking.fee_rate_bps));

        let auth_service = Arc::new(AuthService::new(
            pool.clone(),
            repos.users.clone(),
            settings.auth.session_duration_hours,
        ));
        let booking_service = Arc::new(BookingService::new(
            repos.clone(),
            payments.clone(),
            settings.booking.checkin_secret.clone(),
        ));
        let checkin_service = Arc::new(CheckinService::new(
            repos.clone(),
            settings.booking.utc_offset_hours,
        ));
        let host_account_service = Arc::new(HostAccountService::new(
            repos.clone(),
            payments.clone(),
            settings.server.base_url.clone(),
        ));
        let webhook_reconciler = Arc::new(WebhookReconciler::new(repos.clone(), payments.clone()));

        Self {
            repos,
            auth_service,
            booking_service,
            checkin_service,
            host_account_service,
            webhook_reconciler,
            payments,
            db_pool: pool,
        }
    }
}
