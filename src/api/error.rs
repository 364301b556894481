// src/api/error.rs
// Centralized error taxonomy for HTTP responses and in-band stream errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Request-level errors surfaced to clients as `{code, message}` JSON.
///
/// Validation and authorization variants are raised before any
/// generation side effect and are never retried. Upstream variants come
/// out of `from_provider_failure`.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Upstream provider billing failure (credits exhausted)
    #[error("{0}")]
    PaymentRequired(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Daily message quota exhausted, or an upstream rate limit
    #[error("{0}")]
    RateLimitExceeded(String),

    /// Model id outside the enumerated catalog
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Upstream provider/service failure with no specific signature
    #[error("{0}")]
    Offline(String),

    /// Internal fault (database, serialization)
    #[error("{0}")]
    Internal(String),
}

impl ChatError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimitExceeded(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request:api",
            Self::Unauthorized(_) => "unauthorized:chat",
            Self::PaymentRequired(_) => "payment_required:chat",
            Self::Forbidden(_) => "forbidden:chat",
            Self::NotFound(_) => "not_found:chat",
            Self::RateLimitExceeded(_) => "rate_limit:chat",
            Self::UnknownModel(_) => "unknown_model:chat",
            Self::Offline(_) => "offline:chat",
            Self::Internal(_) => "internal:chat",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::UnknownModel(_) => StatusCode::NOT_FOUND,
            Self::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Offline(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Translate an upstream model-backend failure into a user-facing
    /// remediation message by matching known provider signatures.
    /// Unmatched failures fall back to a generic offline error.
    pub fn from_provider_failure(raw: &str) -> Self {
        if raw.contains("Rate limit reached") {
            return Self::RateLimitExceeded(
                "Upstream rate limit exceeded. Try again in a few minutes or switch to a \
                 different model from the model selector."
                    .into(),
            );
        }

        if raw.contains("credit balance is too low") {
            return Self::PaymentRequired(
                "Provider credits exhausted. Add credits to your provider account or switch \
                 to a different model."
                    .into(),
            );
        }

        if raw.contains("authentication_error")
            || raw.contains("invalid x-api-key")
            || raw.contains("Incorrect API key")
        {
            return Self::Unauthorized(
                "Provider API key is invalid. Check the configured key or switch to a \
                 different model."
                    .into(),
            );
        }

        if raw.contains("API_KEY_INVALID") {
            return Self::Unauthorized(
                "Google API key is invalid. Check your configuration.".into(),
            );
        }

        Self::Offline(
            "The model backend is currently unavailable. Try a different model.".into(),
        )
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(e: sqlx::Error) -> Self {
        error!("database error: {e}");
        Self::Internal("database error".into())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        Self::BadRequest(format!("invalid JSON: {e}"))
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ChatError::rate_limited("x").status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ChatError::PaymentRequired("x".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ChatError::UnknownModel("nope".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ChatError::Offline("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_provider_signature_rate_limit() {
        let e = ChatError::from_provider_failure("Rate limit reached for gpt-4o");
        assert!(matches!(e, ChatError::RateLimitExceeded(_)));
    }

    #[test]
    fn test_provider_signature_credits() {
        let e = ChatError::from_provider_failure("Your credit balance is too low");
        assert!(matches!(e, ChatError::PaymentRequired(_)));
    }

    #[test]
    fn test_provider_signature_bad_key() {
        let e = ChatError::from_provider_failure("authentication_error: invalid x-api-key");
        assert!(matches!(e, ChatError::Unauthorized(_)));
        let e = ChatError::from_provider_failure("API_KEY_INVALID");
        assert!(matches!(e, ChatError::Unauthorized(_)));
    }

    #[test]
    fn test_provider_signature_fallback() {
        let e = ChatError::from_provider_failure("connection reset by peer");
        assert!(matches!(e, ChatError::Offline(_)));
    }

    #[test]
    fn test_codes() {
        assert_eq!(ChatError::bad_request("x").code(), "bad_request:api");
        assert_eq!(ChatError::rate_limited("x").code(), "rate_limit:chat");
    }
}
