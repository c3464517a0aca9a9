use axum::{
    extract::{Extension, State},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::CheckinSummary,
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Json(req), _): WithRejection<Json<VerifyRequest>, AppError>,
) -> Result<Json<CheckinSummary>> {
    let summary = state
        .service_context
        .checkin_service
        .verify(&req.code, current.user.id)
        .await?;

    Ok(Json(summary))
}
