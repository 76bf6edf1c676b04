use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    #[error("Storage error: {message}")]
    StoreFailure { message: String },

    #[error("No free page name found after {attempts} attempts")]
    StoreExhausted { attempts: usize },

    #[error("Page not found: {name}")]
    NotFound { name: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String, retry_after: u64 },

    #[error("Template error: {message}")]
    Template { message: String },
}

impl AppError {
    pub fn payload_too_large(size: usize, limit: usize) -> Self {
        AppError::PayloadTooLarge { size, limit }
    }

    pub fn malformed_input(message: impl Into<String>) -> Self {
        AppError::MalformedInput { message: message.into() }
    }

    pub fn store_failed(message: impl Into<String>) -> Self {
        AppError::StoreFailure { message: message.into() }
    }

    pub fn store_exhausted(attempts: usize) -> Self {
        AppError::StoreExhausted { attempts }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        AppError::NotFound { name: name.into() }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: u64) -> Self {
        AppError::RateLimited { message: message.into(), retry_after }
    }

    pub fn template(message: impl Into<String>) -> Self {
        AppError::Template { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MalformedInput { .. } => StatusCode::BAD_REQUEST,
            AppError::StoreFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::StoreExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Template { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AppError::MalformedInput { .. } => "MALFORMED_INPUT",
            AppError::StoreFailure { .. } => "STORE_FAILED",
            AppError::StoreExhausted { .. } => "STORE_EXHAUSTED",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Template { .. } => "TEMPLATE_ERROR",
        }
    }

    /// Determines if the client may succeed by simply retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StoreFailure { .. }
                | AppError::StoreExhausted { .. }
                | AppError::RateLimited { .. }
        )
    }

    /// Seconds a client should wait before retrying, when known
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimited { retry_after, .. } => Some(*retry_after),
            AppError::StoreFailure { .. } | AppError::StoreExhausted { .. } => Some(1),
            _ => None,
        }
    }

    /// Client-facing message. Storage and template internals stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::StoreFailure { .. } | AppError::StoreExhausted { .. } => {
                "Storage operation failed".to_string()
            }
            AppError::Template { .. } => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }

    /// Converts the error into the generic JSON error response used by the handlers
    pub fn to_response(&self) -> (StatusCode, Json<Value>) {
        (
            self.status_code(),
            Json(json!({
                "error": self.error_code(),
                "message": self.public_message(),
                "retry_after": self.retry_after(),
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::payload_too_large(5000, 4096).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(AppError::malformed_input("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("abc").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::rate_limited("x", 60).status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AppError::store_exhausted(5).status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_store_details_are_not_exposed() {
        let error = AppError::store_failed("disk full at /var/lib/pages/.tmp-123");
        let (status, Json(body)) = error.to_response();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "STORE_FAILED");
        assert!(!body["message"].as_str().unwrap().contains("/var/lib"));
    }

    #[test]
    fn test_retry_hints() {
        assert!(AppError::rate_limited("x", 42).is_retryable());
        assert_eq!(AppError::rate_limited("x", 42).retry_after(), Some(42));
        assert!(!AppError::not_found("abc").is_retryable());
        assert_eq!(AppError::malformed_input("x").retry_after(), None);
    }
}
