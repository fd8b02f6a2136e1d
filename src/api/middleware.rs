// Per-IP rate limiting for public form submissions

use axum::{
    extract::{MatchedPath, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::api::responses::{request_id, ApiError};
use crate::auth::auth_middleware::client_ip;
use crate::core::errors::AppError;
use crate::metrics::Metrics;
use crate::store::EphemeralStore;

pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RateLimitState {
    pub ephemeral: Arc<dyn EphemeralStore + Send + Sync>,
    pub metrics: Arc<Metrics>,
    pub limit_per_window: u64,
    pub window: Duration,
    pub trust_proxy: bool,
}

/// Fixed-window counter keyed by route and client IP.
///
/// Only POST requests count; reads on the same paths pass through. When
/// Redis is unreachable the request is let through (fail-open) and a
/// warning is logged.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() != Method::POST {
        return Ok(next.run(request).await);
    }

    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let ip = client_ip(request.headers(), request.extensions(), state.trust_proxy)
        .unwrap_or_else(|| "unknown".to_string());
    let key = rate_limit_key(&route, &ip);

    match state.ephemeral.hit(&key, state.window).await {
        Ok(count) if count > state.limit_per_window => {
            warn!(route = %route, ip = %ip, count = count, "Rate limit exceeded");
            state.metrics.rate_limited.with_label_values(&[route.as_str()]).inc();
            Err(ApiError::from(AppError::RateLimited).with_request_id(request_id(request.headers())))
        }
        Ok(_) => Ok(next.run(request).await),
        Err(e) => {
            warn!(error = %e, route = %route, "Rate limiter unavailable, allowing request");
            Ok(next.run(request).await)
        }
    }
}

fn rate_limit_key(route: &str, ip: &str) -> String {
    format!("ratelimit:{}:{}", route, ip)
}
