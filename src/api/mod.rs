pub mod handlers;
pub mod middleware;
pub mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{config::Settings, payments::WebhookVerifier, service::ServiceContext};
use state::AppState;

pub fn create_app(
    service_context: Arc<ServiceContext>,
    webhook_verifier: Option<Arc<WebhookVerifier>>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(service_context, webhook_verifier, settings);

    Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .nest("/api", api_routes(app_state.clone()))
        .with_state(app_state)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Authenticated by signature, not session.
        .route("/webhooks/stripe", post(handlers::webhooks::stripe))
        .merge(session_routes(state))
}

fn session_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/bookings",
            get(handlers::bookings::list).post(handlers::bookings::create),
        )
        .route("/bookings/:id", get(handlers::bookings::get))
        .route("/bookings/:id/accept", post(handlers::bookings::accept))
        .route("/bookings/:id/reject", post(handlers::bookings::reject))
        .route("/bookings/:id/cancel", post(handlers::bookings::cancel))
        .route("/bookings/:id/start", post(handlers::bookings::start))
        .route("/bookings/:id/complete", post(handlers::bookings::complete))
        .route("/bookings/:id/payment", get(handlers::bookings::payment))
        .route("/bookings/:id/checkin-qr", get(handlers::bookings::checkin_qr))
        .route("/checkin/verify", post(handlers::checkin::verify))
        .route(
            "/host-account",
            get(handlers::host_accounts::status).post(handlers::host_accounts::create),
        )
        .route(
            "/host-account/onboarding-link",
            post(handlers::host_accounts::onboarding_link),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_auth,
        ))
}
