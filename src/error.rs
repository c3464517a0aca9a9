use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::BookingStatus;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Booking is already {current}")]
    AlreadyDecided { current: BookingStatus },

    #[error("Host payment account is not ready")]
    PaymentAccountNotReady { remediation: String },

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid check-in code format")]
    InvalidFormat,

    #[error("Check-in code not found or already used")]
    NotFoundOrUsed,

    #[error("Booking is not scheduled for today")]
    WrongDate,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable kind sent to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Conflict(_) => "conflict",
            AppError::AlreadyDecided { .. } => "already_decided",
            AppError::PaymentAccountNotReady { .. } => "payment_account_not_ready",
            AppError::PaymentGateway(_) => "payment_gateway_error",
            AppError::InvalidSignature => "invalid_signature",
            AppError::InvalidFormat => "invalid_format",
            AppError::NotFoundOrUsed => "not_found_or_used",
            AppError::WrongDate => "wrong_date",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let detail = match &self {
            AppError::AlreadyDecided { current } => Some(("current", json!(current))),
            AppError::PaymentAccountNotReady { remediation } => Some(("remediation", json!(remediation))),
            _ => None,
        };
        let (status, error_message) = match self {
            AppError::Database(ref msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string())
            }
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::InvalidInput(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::AlreadyDecided { current } => {
                (StatusCode::CONFLICT, format!("Booking is already {}", current))
            }
            AppError::PaymentAccountNotReady { .. } => (
                StatusCode::CONFLICT,
                "Complete payment account onboarding before accepting bookings".to_string(),
            ),
            AppError::PaymentGateway(ref msg) => {
                tracing::error!("Payment gateway error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment provider request failed".to_string())
            }
            AppError::InvalidSignature => {
                (StatusCode::BAD_REQUEST, "Invalid signature".to_string())
            }
            AppError::InvalidFormat => {
                (StatusCode::BAD_REQUEST, "Invalid check-in code".to_string())
            }
            AppError::NotFoundOrUsed => (
                StatusCode::NOT_FOUND,
                "Check-in code not found or already used".to_string(),
            ),
            AppError::WrongDate => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "This session is not scheduled for today".to_string(),
            ),
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let mut error = json!({
            "kind": kind,
            "message": error_message,
        });
        if let Some((field, value)) = detail {
            error[field] = value;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

// Extractor failures share the JSON error body with every other client error.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}
