use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    BadRequest(String),
    Internal(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {msg}"),
            AppError::Internal(msg) => write!(f, "Internal Error: {msg}"),
            AppError::Database(err) => write!(f, "Database Error: {err}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized: {msg}");
                (StatusCode::UNAUTHORIZED, axum::Json(json!({ "error": "Unauthorized" })))
                    .into_response()
            }
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({ "error": msg })),
            )
                .into_response(),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                internal_response(msg)
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {err}");
                internal_response(&err.to_string())
            }
        }
    }
}

// The trigger caller is an automated scheduler; it gets the error message and
// a timestamp so failed runs are diagnosable from its logs alone.
fn internal_response(error: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(json!({
            "success": false,
            "error": error,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}
