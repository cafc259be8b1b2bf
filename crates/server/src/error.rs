use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("Not authorized, please log in")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("You are already enrolled in this course")]
    AlreadyEnrolled,

    #[error("Invalid or expired access code")]
    InvalidCoupon,

    #[error("Course not completed yet")]
    NotComplete,

    #[error("{0}")]
    Internal(String),

    #[error("Database error")]
    Database(#[source] sqlx::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::NotComplete => StatusCode::FORBIDDEN,
            AppError::Validation(_)
            | AppError::Conflict(_)
            | AppError::AlreadyEnrolled
            | AppError::InvalidCoupon => StatusCode::BAD_REQUEST,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Duplicate entry".to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Database(err) => tracing::error!(error = ?err, "database error"),
            AppError::Internal(msg) => tracing::error!(%msg, "internal error"),
            _ => tracing::debug!(%status, error = %self, "request rejected"),
        }

        let message = match &self {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}
