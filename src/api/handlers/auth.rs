use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::{CookieJar, WithRejection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::state::AppState,
    auth::{AuthService, SESSION_COOKIE},
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub display_name: String,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, AppError>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let auth_service = &state.service_context.auth_service;
    let (user, token) = auth_service.login(&req.email, &req.password).await?;

    let secure = state.settings.server.base_url.starts_with("https://");
    let cookie = auth_service.create_session_cookie(&token, secure);

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            user_id: user.id,
            display_name: user.display_name,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<(CookieJar, StatusCode)> {
    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        if let Err(e) = state
            .service_context
            .auth_service
            .invalidate_session(session_cookie.value())
            .await
        {
            tracing::warn!("Failed to invalidate session: {}", e);
        }
    }

    Ok((jar.add(AuthService::create_logout_cookie()), StatusCode::NO_CONTENT))
}
