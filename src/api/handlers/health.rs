// Liveness and metrics endpoints

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::responses::{ApiError, HealthResponse};
use crate::api::AppState;
use crate::core::errors::AppError;

const PING_TIMEOUT: Duration = Duration::from_millis(500);

/// Ping one dependency; a slow dependency reports as "slow", not down
async fn probe<F>(name: &str, ping: F) -> &'static str
where
    F: std::future::Future<Output = Result<(), AppError>>,
{
    match tokio::time::timeout(PING_TIMEOUT, ping).await {
        Ok(Ok(())) => "connected",
        Ok(Err(e)) => {
            warn!(dependency = name, error = %e, "Health check ping failed");
            "disconnected"
        }
        Err(_) => {
            debug!(dependency = name, "Health check ping timed out");
            "slow"
        }
    }
}

/// GET /health
///
/// Database down is 503. Redis only degrades rate limiting and webhook
/// de-duplication, so it never fails the check.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, redis) = tokio::join!(
        probe("database", state.database.ping()),
        probe("redis", state.ephemeral.ping()),
    );

    let (code, status) = match (database, redis) {
        ("connected", "connected") => (StatusCode::OK, "healthy"),
        ("connected", _) => (StatusCode::OK, "degraded"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            database: database.to_string(),
            redis: redis.to_string(),
        }),
    )
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state.metrics.render()?;
    Ok((
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        body,
    ))
}
