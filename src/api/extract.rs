// Request extractors shared by the handlers

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::api::responses::{request_id, ApiError};
use crate::api::AppState;
use crate::auth::auth_middleware::{client_ip, user_agent};
use crate::core::errors::AppError;

/// `Json<T>` whose rejections use the API error body with status 400
/// (axum answers 422 for well-formed JSON of the wrong shape)
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let rid = request_id(req.headers());
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => {
                let message = match rejection {
                    JsonRejection::MissingJsonContentType(_) => {
                        "Expected a JSON body with Content-Type: application/json".to_string()
                    }
                    other => other.body_text(),
                };
                Err(ApiError::from(AppError::BadRequest(message)).with_request_id(rid))
            }
        }
    }
}

/// Caller address and user agent for rate limiting and audit logs
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(ClientInfo {
            ip: client_ip(&parts.headers, &parts.extensions, state.config.trust_proxy),
            user_agent: user_agent(&parts.headers),
        })
    }
}
