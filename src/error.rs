//! Error types for Threadline
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
///
/// Every operation of the content graph reports failures through this
/// enum. Callers that only care about the coarse category use
/// [`AppError::kind`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Referenced thread, comment, user or hashtag is absent or soft-deleted (404)
    #[error("{0}")]
    NotFound(String),

    /// Actor is not the author of the resource (403)
    #[error("{0}")]
    Forbidden(String),

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Content length, blank content, self-follow (400)
    #[error("{0}")]
    Validation(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Blob store error (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Stable error category exposed at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    ValidationError,
    Unauthorized,
    Unexpected,
}

impl AppError {
    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("{} not found with id: {}", what, id))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Forbidden(_) => ErrorKind::PermissionDenied,
            AppError::Validation(_) => ErrorKind::ValidationError,
            AppError::Unauthorized => ErrorKind::Unauthorized,
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Internal(_) => ErrorKind::Unexpected,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// NotFound and PermissionDenied stay distinguishable (404 vs 403).
    /// Unexpected failures are logged and reported without internals.
    fn into_response(self) -> Response {
        use axum::Json;

        let kind = self.kind();
        let (status, error_message, error_type) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), "not_found"),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), "forbidden"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::Database(error) => {
                tracing::error!(%error, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    "database",
                )
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                    "storage",
                )
            }
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(error) => {
                tracing::error!(%error, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "internal",
                )
            }
        };

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_forbidden_map_to_distinct_statuses() {
        let not_found = AppError::not_found("Thread", 7).into_response();
        let forbidden = AppError::Forbidden("nope".to_string()).into_response();

        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn kinds_fold_infrastructure_errors_into_unexpected() {
        assert_eq!(
            AppError::Storage("down".to_string()).kind(),
            ErrorKind::Unexpected
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).kind(),
            ErrorKind::Unexpected
        );
        assert_eq!(
            AppError::Validation("blank".to_string()).kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(AppError::Unauthorized.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn not_found_message_names_resource() {
        let error = AppError::not_found("Comment", 42);
        assert_eq!(error.to_string(), "Comment not found with id: 42");
    }
}
