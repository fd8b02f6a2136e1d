// Domain error types - safe error handling with no information disclosure

use serde::Serialize;
use thiserror::Error;

/// A single failed field check, reported back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AppError {
    /// One or more request fields failed validation (HTTP 400)
    #[error("Validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    /// Malformed request that is not a field problem (HTTP 400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Wrong email/password pair (HTTP 401)
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Missing or invalid token (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource lookup failed (HTTP 404)
    #[error("{0} not found")]
    NotFound(String),

    /// Unique constraint or state conflict (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload or body exceeds a limit (HTTP 413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Per-client request budget exhausted (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Stripe webhook signature did not verify (HTTP 400)
    #[error("Webhook signature error: {0}")]
    WebhookSignature(String),

    /// Card declined or similar payment-level failure (HTTP 402)
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// Upstream service returned an error (HTTP 502)
    #[error("Dependency failure in {service}: {error}")]
    DependencyFailure { service: String, error: String },

    /// Upstream temporarily unavailable, e.g. open circuit (HTTP 503)
    #[error("Transient error: {0}")]
    TransientError(String),

    /// Database error (HTTP 500)
    #[error("Database error: {0}")]
    Database(String),

    /// Redis/cache error (HTTP 500)
    #[error("State error: {0}")]
    StateError(String),

    /// Configuration error (HTTP 500)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Anything else (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::BadRequest(_) => 400,
            AppError::InvalidCredentials => 401,
            AppError::Unauthorized(_) => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::PayloadTooLarge(_) => 413,
            AppError::RateLimited => 429,
            AppError::WebhookSignature(_) => 400,
            AppError::PaymentDeclined(_) => 402,
            AppError::DependencyFailure { .. } => 502,
            AppError::TransientError(_) => 503,
            AppError::Database(_) => 500,
            AppError::StateError(_) => 500,
            AppError::ConfigurationError(_) => 500,
            AppError::Internal(_) => 500,
        }
    }

    /// Get user-friendly error message (no sensitive information)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Validation failed".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::InvalidCredentials => "Invalid email or password".to_string(),
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::NotFound(what) => format!("{} not found", what),
            AppError::Conflict(msg) => msg.clone(),
            AppError::PayloadTooLarge(msg) => msg.clone(),
            AppError::RateLimited => "Too many requests, please try again later".to_string(),
            AppError::WebhookSignature(_) => "Invalid webhook signature".to_string(),
            AppError::PaymentDeclined(msg) => msg.clone(),
            AppError::DependencyFailure { .. } => "Service unavailable".to_string(),
            AppError::TransientError(_) => "Service temporarily unavailable".to_string(),
            AppError::Database(_)
            | AppError::StateError(_)
            | AppError::ConfigurationError(_)
            | AppError::Internal(_) => "Internal error".to_string(),
        }
    }

    /// Field details for validation failures
    pub fn details(&self) -> Option<&[FieldError]> {
        match self {
            AppError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Shorthand for a single-field validation failure
    pub fn invalid_field(field: &str, message: &str) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }
}

/// Client-facing message for a unique index, by index name
fn unique_violation_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("volunteer_applications_pending_unique") => {
            "You already have a pending application for this program"
        }
        Some(constraint) if constraint.contains("email") => "Email is already in use",
        _ => "Record already exists",
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(unique_violation_message(db_err.constraint()).to_string())
            }
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::StateError(err.to_string())
    }
}
