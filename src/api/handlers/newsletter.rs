// Newsletter subscriptions

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::info;

use crate::api::extract::ValidJson;
use crate::api::responses::{ApiError, MessageResponse};
use crate::api::AppState;
use crate::auth::auth_middleware::AdminUser;
use crate::auth::opaque_token::{OpaqueToken, TokenHash};
use crate::core::models::{NewsletterSubscription, SubscriptionStatus};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::{NewsletterRequest, UnsubscribeRequest};
use crate::store::{NewsletterStats, SubscribeOutcome};

/// POST /api/newsletter/subscribe
///
/// Each (re)subscription gets a fresh unsubscribe token. Only its hash is
/// stored; the raw token goes out in the welcome email.
pub async fn subscribe(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<NewsletterRequest>,
) -> Result<(StatusCode, Json<NewsletterSubscription>), ApiError> {
    let request = request.validate()?;
    let token = OpaqueToken::generate();

    let outcome = state.newsletter.subscribe(&request, &token.hash()).await?;
    let resubscribed = matches!(outcome, SubscribeOutcome::Resubscribed(_));
    let subscription = outcome.subscription().clone();
    info!(subscription_id = %subscription.id, resubscribed, "Newsletter subscription");

    state.notifier.newsletter_welcome(&subscription, token.expose_secret());
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// POST /api/newsletter/unsubscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<UnsubscribeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = request.validate()?;
    let subscription = state
        .newsletter
        .unsubscribe(&TokenHash::from_token(&request.token))
        .await?;
    info!(subscription_id = %subscription.id, "Newsletter unsubscribe");
    Ok(MessageResponse::new("You have been unsubscribed"))
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriberQuery {
    pub status: Option<SubscriptionStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/newsletter/subscribers
pub async fn subscribers(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<SubscriberQuery>,
) -> Result<Json<Page<NewsletterSubscription>>, ApiError> {
    let page = state
        .newsletter
        .list(query.status, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(Json(page))
}

/// GET /api/newsletter/stats
pub async fn stats(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<NewsletterStats>, ApiError> {
    Ok(Json(state.newsletter.stats().await?))
}
