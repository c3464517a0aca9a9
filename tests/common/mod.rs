#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use pocketlesson::{
    config::Settings,
    domain::{Booking, CreateBookingRequest, CreateUserRequest, DecisionOutcome, Listing, User},
    payments::{fixtures, FakeStripeGateway, WebhookEvent, WebhookVerifier},
    repository::{HostAccountRepository, ListingRepository, UserRepository},
    service::ServiceContext,
};

pub const HOST_ACCOUNT: &str = "acct_test_host";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct TestContext {
    pub pool: SqlitePool,
    pub gateway: Arc<FakeStripeGateway>,
    pub services: Arc<ServiceContext>,
    pub settings: Settings,
    pub host: User,
    pub guest: User,
    pub listing: Listing,
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.booking.checkin_secret = "test-checkin-secret".to_string();
    settings.stripe.webhook_secret = Some(WEBHOOK_SECRET.to_string());
    settings
}

/// One connection keeps the in-memory database alive for the whole test.
pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub async fn setup() -> anyhow::Result<TestContext> {
    let pool = test_pool().await?;
    let settings = test_settings();
    let gateway = Arc::new(FakeStripeGateway::new());
    let services = Arc::new(ServiceContext::new(pool.clone(), gateway.clone(), &settings));

    let host = create_user(&services, "host@example.com", "Keiko Tanaka").await?;
    let guest = create_user(&services, "guest@example.com", "Sam Rivera").await?;

    let now = Utc::now();
    let listing = services
        .repos
        .listings
        .create(Listing {
            id: Uuid::new_v4(),
            host_id: host.id,
            title: "Conversational Japanese".to_string(),
            price: 1500,
            duration_minutes: 60,
            venues: vec!["shibuya-cafe".to_string(), "online".to_string()],
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;

    Ok(TestContext {
        pool,
        gateway,
        services,
        settings,
        host,
        guest,
        listing,
    })
}

pub async fn create_user(services: &ServiceContext, email: &str, name: &str) -> anyhow::Result<User> {
    Ok(services
        .repos
        .users
        .create(CreateUserRequest {
            email: email.to_string(),
            display_name: name.to_string(),
            password: "password123".to_string(),
        })
        .await?)
}

pub fn session_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 4, 12).unwrap()
}

pub fn booking_request(ctx: &TestContext) -> CreateBookingRequest {
    CreateBookingRequest {
        listing_id: ctx.listing.id,
        date: session_date().format("%Y-%m-%d").to_string(),
        start_time: "10:00".to_string(),
        venue_id: "shibuya-cafe".to_string(),
        note: Some("First lesson, beginner".to_string()),
    }
}

impl TestContext {
    pub async fn verify_host(&self) -> anyhow::Result<()> {
        self.services.repos.host_accounts.create(self.host.id, HOST_ACCOUNT).await?;
        self.services
            .repos
            .host_accounts
            .update_capabilities(HOST_ACCOUNT, true, true)
            .await?;
        Ok(())
    }

    pub async fn pending_booking(&self) -> anyhow::Result<Booking> {
        Ok(self
            .services
            .booking_service
            .create(self.guest.id, booking_request(self))
            .await?)
    }

    /// A booking accepted by a verified host, with a pending ledger entry.
    pub async fn confirmed_booking(&self) -> anyhow::Result<Booking> {
        if self.services.repos.host_accounts.find_by_host(self.host.id).await?.is_none() {
            self.verify_host().await?;
        }
        let booking = self.pending_booking().await?;
        match self.services.booking_service.accept(booking.id, self.host.id).await? {
            DecisionOutcome::Accepted { booking, .. } => Ok(booking),
            other => anyhow::bail!("expected acceptance, got {:?}", other),
        }
    }

    pub async fn booking(&self, id: Uuid) -> anyhow::Result<Booking> {
        Ok(self.services.booking_service.get(id, self.guest.id).await?)
    }
}

/// Signs `object` as a gateway event and runs it through the verifier.
pub fn event(id: &str, event_type: &str, object: Value) -> WebhookEvent {
    let now = Utc::now().timestamp();
    let payload = fixtures::event_payload(id, event_type, object, now);
    let signature = fixtures::sign_payload(WEBHOOK_SECRET, &payload, now);
    WebhookVerifier::new(WEBHOOK_SECRET.to_string())
        .construct_event(payload.as_bytes(), &signature)
        .unwrap()
}

pub fn payment_succeeded(id: &str, intent: &str, amount: i64) -> WebhookEvent {
    event(
        id,
        "payment_intent.succeeded",
        fixtures::payment_intent(intent, amount, &HashMap::new()),
    )
}

pub fn payment_failed(id: &str, intent: &str, message: &str) -> WebhookEvent {
    event(
        id,
        "payment_intent.payment_failed",
        fixtures::failed_payment_intent(intent, 1500, message),
    )
}

pub fn account_updated(id: &str, account: &str, charges_enabled: bool, payouts_enabled: bool) -> WebhookEvent {
    event(
        id,
        "account.updated",
        fixtures::account(account, charges_enabled, payouts_enabled),
    )
}

pub fn charge_refunded(id: &str, intent: &str, amount_refunded: i64, refund_id: Option<&str>) -> WebhookEvent {
    event(
        id,
        "charge.refunded",
        fixtures::charge("ch_test_1", intent, 1500, amount_refunded, refund_id),
    )
}
