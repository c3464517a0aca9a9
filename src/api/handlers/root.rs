use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "PocketLesson API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Booking and payments for short in-person sessions",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "auth": "/auth/login",
            "bookings": "/api/bookings",
            "checkin": "/api/checkin/verify",
            "host_account": "/api/host-account",
            "webhooks": "/api/webhooks/stripe"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}
