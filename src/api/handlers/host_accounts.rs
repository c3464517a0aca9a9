use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Serialize;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::HostAccount,
    error::{AppError, Result},
};

#[derive(Debug, Serialize)]
pub struct OnboardingLinkResponse {
    url: String,
}

pub async fn status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<HostAccount>> {
    let account = state
        .service_context
        .host_account_service
        .status(current.user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No payment account yet".to_string()))?;

    Ok(Json(account))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<HostAccount>> {
    let account = state
        .service_context
        .host_account_service
        .create_account(&current.user)
        .await?;

    Ok(Json(account))
}

pub async fn onboarding_link(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<OnboardingLinkResponse>> {
    let url = state
        .service_context
        .host_account_service
        .onboarding_link(current.user.id)
        .await?;

    Ok(Json(OnboardingLinkResponse { url }))
}
