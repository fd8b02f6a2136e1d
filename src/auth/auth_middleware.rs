// Axum authentication middleware and extractors

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

use crate::api::responses::{request_id, ApiError};
use crate::auth::token::TokenIssuer;
use crate::core::errors::AppError;
use crate::core::models::User;
use crate::store::UserStore;

/// Dependencies of the `identify` middleware
#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<TokenIssuer>,
    pub users: Arc<dyn UserStore + Send + Sync>,
}

/// The signed-in, active user making the request
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// A signed-in administrator
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

/// Resolve the caller from `Authorization: Bearer <jwt>`.
///
/// Requests without the header pass through anonymously; handlers decide
/// whether that is acceptable through the `AuthUser` extractors. A header
/// that is present but invalid is always rejected with 401.
pub async fn identify(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_bearer_token(request.headers()) else {
        return Ok(next.run(request).await);
    };
    let rid = request_id(request.headers());

    let claims = auth_state
        .tokens
        .verify(&token)
        .map_err(|e| ApiError::from(e).with_request_id(rid.clone()))?;

    let user = auth_state
        .users
        .find_by_id(claims.sub)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(rid.clone()))?
        .filter(|user| user.is_active)
        .ok_or_else(|| {
            debug!(user_id = %claims.sub, "Token for missing or inactive user");
            ApiError::from(AppError::Unauthorized("User not found or inactive".to_string()))
                .with_request_id(rid.clone())
        })?;

    request.extensions_mut().insert(AuthUser(user));
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            ApiError::from(AppError::Unauthorized("Authentication required".to_string()))
                .with_request_id(request_id(&parts.headers))
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.is_admin() {
            Ok(AdminUser(user))
        } else {
            Err(ApiError::from(AppError::Forbidden("Admin access required".to_string()))
                .with_request_id(request_id(&parts.headers)))
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Client address for rate limiting and audit logs
///
/// The socket peer is the client unless `trust_proxy` is set, in which case
/// `X-Forwarded-For` (first hop) and then `X-Real-IP` are consulted before
/// it. Header values that do not parse as an IP address are ignored.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions, trust_proxy: bool) -> Option<String> {
    let peer = || {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    };
    if !trust_proxy {
        return peer().map(|ip| ip.to_string());
    }

    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    let real_ip = headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    forwarded
        .into_iter()
        .chain(real_ip)
        .find_map(|candidate| candidate.parse::<IpAddr>().ok())
        .or_else(peer)
        .map(|ip| ip.to_string())
}

/// Extract user agent from request headers
pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
