use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::{
    api::state::AppState,
    auth::SESSION_COOKIE,
    domain::User,
    error::AppError,
};

#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
}

/// Resolves the session cookie to a user and stores it as a request
/// extension for the handlers behind this layer.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session_cookie = jar.get(SESSION_COOKIE).ok_or(AppError::Unauthorized)?;

    let user = state
        .service_context
        .auth_service
        .current_user(session_cookie.value())
        .await?
        .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(CurrentUser { user });

    Ok(next.run(request).await)
}
