use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use crate::{
    api::state::AppState,
    error::{AppError, Result},
    payments::webhook::SIGNATURE_HEADER,
};

/// Gateway callbacks. Anything that fails verification is a 400; once the
/// signature checks out the event is acknowledged even if applying it failed.
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    let Some(verifier) = state.webhook_verifier.as_ref() else {
        tracing::warn!("Webhook received but no webhook secret is configured");
        return Err(AppError::InvalidSignature);
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    let event = verifier.construct_event(&body, signature).map_err(|e| {
        tracing::warn!("Rejected webhook: {}", e);
        e
    })?;

    let outcome = state
        .service_context
        .webhook_reconciler
        .reconcile(&event)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "received": true,
            "outcome": outcome.as_str(),
        })),
    ))
}
