use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pocketlesson::{
    api,
    config::Settings,
    payments::{DisabledGateway, PaymentGateway, StripeGateway, WebhookVerifier},
    repository::ReconciliationRepository,
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pocketlesson=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting PocketLesson server on {}:{}", settings.server.host, settings.server.port);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let gateway: Arc<dyn PaymentGateway> = match (&settings.stripe.enabled, &settings.stripe.secret_key) {
        (true, Some(api_key)) => {
            tracing::info!("Stripe payment processing enabled");
            Arc::new(StripeGateway::new(api_key.clone(), &settings.stripe.currency))
        }
        (true, None) => {
            tracing::warn!("Stripe enabled but no secret key configured; payments disabled");
            Arc::new(DisabledGateway)
        }
        (false, _) => {
            tracing::info!("Stripe payment processing disabled");
            Arc::new(DisabledGateway)
        }
    };

    let webhook_verifier = settings.stripe.webhook_secret.clone().map(|secret| {
        Arc::new(WebhookVerifier::new(secret))
    });
    if webhook_verifier.is_none() {
        tracing::warn!("No webhook secret configured; gateway callbacks will be refused");
    }

    let service_context = Arc::new(ServiceContext::new(db_pool.clone(), gateway, &settings));

    match service_context.auth_service.cleanup_expired_sessions().await {
        Ok(removed) if removed > 0 => tracing::info!("Removed {} expired sessions", removed),
        Ok(_) => {}
        Err(e) => tracing::warn!("Session cleanup failed: {}", e),
    }

    match service_context.repos.reconciliation.list_open().await {
        Ok(open) if !open.is_empty() => tracing::warn!(
            open = open.len(),
            "Reconciliation tasks are waiting for review"
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not read reconciliation queue: {}", e),
    }

    let app = api::create_app(service_context, webhook_verifier, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        settings.server.host, settings.server.port
    ))
    .await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}
