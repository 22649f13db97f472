//! Error taxonomy shared across services and API handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Business-rule guard: the subscription is managed by Stripe and must
    /// not be touched by the manual-grant code path.
    #[error("subscription is managed by Stripe; manual changes are not allowed")]
    StripeManaged,

    #[error("unknown product id: {0}")]
    UnknownProductId(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("payment provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::InvalidInput(_) | AppError::UnknownProductId(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::StripeManaged => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Provider(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
