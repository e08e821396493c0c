//! Error handling for Flow Timer
//!
//! Centralized error types and handling for the application. Provider
//! specific failures are folded into a closed [`ErrorKind`] at the boundary
//! so callers only ever branch on a handful of cases.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Closed classification of every failure a collaborator call can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum ErrorKind {
    /// Provider credentials are missing; the feature is disabled
    ConfigMissing,
    /// No user, or the provider rejected the credentials
    Unauthenticated,
    /// The provider needs a fresh login before this operation
    RequiresReauth,
    /// Network, database or gateway failure; safe to retry
    TransientIo,
    /// Input rejected before any network call was made
    Validation,
}

impl ErrorKind {
    /// Message suitable for showing directly to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::ConfigMissing => "This feature is not available right now.",
            ErrorKind::Unauthenticated => "Please log in to continue.",
            ErrorKind::RequiresReauth => {
                "For security reasons, you must log in again before doing this."
            }
            ErrorKind::TransientIo => "Something went wrong. Please try again later.",
            ErrorKind::Validation => "Please check the form and try again.",
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    #[error("Authentication error: {0}")]
    Unauthenticated(String),

    #[error("Recent login required")]
    RequiresReauth,

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Premium membership required")]
    PremiumRequired,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Classify this error into the closed kind enumeration
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ConfigMissing(_) => ErrorKind::ConfigMissing,
            AppError::Unauthenticated(_) | AppError::PremiumRequired => ErrorKind::Unauthenticated,
            AppError::RequiresReauth => ErrorKind::RequiresReauth,
            AppError::Validation(_)
            | AppError::InvalidSignature(_)
            | AppError::BadRequest(_)
            | AppError::UrlParse(_)
            | AppError::Conflict(_)
            | AppError::NotFound(_) => ErrorKind::Validation,
            AppError::Database(_)
            | AppError::Serialization(_)
            | AppError::Io(_)
            | AppError::HttpClient(_)
            | AppError::Upstream(_)
            | AppError::Internal(_) => ErrorKind::TransientIo,
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::Serialization(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::HttpClient(_) | AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::ConfigMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthenticated(_) | AppError::RequiresReauth => StatusCode::UNAUTHORIZED,
            AppError::PremiumRequired => StatusCode::FORBIDDEN,
            AppError::Validation(_)
            | AppError::InvalidSignature(_)
            | AppError::BadRequest(_)
            | AppError::UrlParse(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DatabaseError",
            AppError::Serialization(_) => "SerializationError",
            AppError::Io(_) => "IoError",
            AppError::HttpClient(_) => "HttpClientError",
            AppError::UrlParse(_) => "UrlParseError",
            AppError::ConfigMissing(_) => "ConfigMissing",
            AppError::Unauthenticated(_) => "Unauthenticated",
            AppError::RequiresReauth => "RequiresReauth",
            AppError::Upstream(_) => "UpstreamError",
            AppError::Validation(_) => "ValidationError",
            AppError::InvalidSignature(_) => "InvalidSignature",
            AppError::PremiumRequired => "PremiumRequired",
            AppError::Conflict(_) => "Conflict",
            AppError::NotFound(_) => "NotFound",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Internal(_) => "InternalError",
        }
    }

    /// Check if this error should be logged as an error vs warning
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    pub fn config_missing(what: &str) -> Self {
        AppError::ConfigMissing(what.to_string())
    }

    pub fn unauthenticated(message: &str) -> Self {
        AppError::Unauthenticated(message.to_string())
    }

    pub fn validation_error(message: &str) -> Self {
        AppError::Validation(message.to_string())
    }

    pub fn conflict(message: &str) -> Self {
        AppError::Conflict(message.to_string())
    }

    pub fn internal_error(message: &str) -> Self {
        AppError::Internal(message.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(error = %message, code = error_code, "request failed");
        } else {
            tracing::warn!(error = %message, code = error_code, "request rejected");
        }

        let body = Json(json!({
            "error": error_code,
            "kind": self.kind(),
            "message": message,
            "user_message": self.kind().user_message(),
            "timestamp": chrono::Utc::now().timestamp()
        }));

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::BadRequest("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::RequiresReauth.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::PremiumRequired.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::config_missing("stripe").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(AppError::config_missing("x").kind(), ErrorKind::ConfigMissing);
        assert_eq!(AppError::unauthenticated("x").kind(), ErrorKind::Unauthenticated);
        assert_eq!(AppError::RequiresReauth.kind(), ErrorKind::RequiresReauth);
        assert_eq!(AppError::Upstream("x".to_string()).kind(), ErrorKind::TransientIo);
        assert_eq!(AppError::validation_error("x").kind(), ErrorKind::Validation);
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).kind(),
            ErrorKind::TransientIo
        );
    }

    #[test]
    fn test_server_error_detection() {
        assert!(AppError::Internal("test".to_string()).is_server_error());
        assert!(AppError::Database(sqlx::Error::RowNotFound).is_server_error());
        assert!(!AppError::BadRequest("test".to_string()).is_server_error());
        assert!(!AppError::RequiresReauth.is_server_error());
    }

    #[test]
    fn test_error_response_format() {
        let response = AppError::InvalidSignature("no v1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
