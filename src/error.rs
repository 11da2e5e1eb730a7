/// Unified error types for Coachhub
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum HubError {
    /// Missing or unusable credentials
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    /// Token signature verified but its expiry has passed
    #[error("Token has expired")]
    TokenExpired,

    /// Token jti is present in the revocation set
    #[error("Token has been revoked")]
    TokenRevoked,

    /// Token signature does not match
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token could not be decoded into claims
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Role or ownership mismatch
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g. responding to a non-pending request)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Too many failed logins
    #[error("Account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    /// Storage errors; a failed transaction is rolled back entirely
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Whether the failure concerns the caller's credentials rather than the request
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            HubError::AuthenticationRequired(_)
                | HubError::TokenExpired
                | HubError::TokenRevoked
                | HubError::InvalidSignature
                | HubError::MalformedToken(_)
        )
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert HubError to HTTP response
impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            HubError::AuthenticationRequired(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            HubError::TokenExpired => (StatusCode::UNAUTHORIZED, "TokenExpired", self.to_string()),
            HubError::TokenRevoked => (StatusCode::UNAUTHORIZED, "TokenRevoked", self.to_string()),
            HubError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "InvalidSignature",
                self.to_string(),
            ),
            HubError::MalformedToken(_) => (
                StatusCode::UNAUTHORIZED,
                "MalformedToken",
                self.to_string(),
            ),
            HubError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden", self.to_string()),
            HubError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            HubError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            HubError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            HubError::AccountLocked { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "AccountLocked",
                self.to_string(),
            ),
            HubError::Database(_) | HubError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        } else if self.is_auth_failure() {
            tracing::debug!(error = %self, "request not authenticated");
        }

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type HubResult<T> = Result<T, HubError>;
