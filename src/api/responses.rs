// Response types for API endpoints

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::core::errors::{AppError, FieldError};
use crate::core::models::User;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub redis: String,
}

/// Returned by register and login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// API error type that converts domain errors to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Vec<FieldError>>,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: String) -> Self {
        Self {
            status,
            message,
            details: None,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Convert a domain error. Server-side failures are logged here with
    /// their internal detail; the client only sees `user_message`.
    pub fn from_app_error(err: AppError) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %err, status = status.as_u16(), "Request failed");
        } else if matches!(err, AppError::WebhookSignature(_)) {
            warn!(error = %err, "Rejected webhook");
        }

        Self {
            status,
            message: err.user_message(),
            details: err.details().map(|d| d.to_vec()),
            request_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            details: self.details,
            request_id: self.request_id,
        });
        (self.status, body).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::from_app_error(err)
    }
}

/// The id set by the request-id layer, if any
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
