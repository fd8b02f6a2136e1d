// Visitor feedback

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::extract::ValidJson;
use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::auth::auth_middleware::{AdminUser, AuthUser};
use crate::core::models::{Feedback, FeedbackKind, FeedbackStatus};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::{FeedbackRequest, FeedbackStatusRequest};
use crate::store::FeedbackFilter;

/// POST /api/feedback
pub async fn create(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    ValidJson(request): ValidJson<FeedbackRequest>,
) -> Result<(StatusCode, Json<Feedback>), ApiError> {
    let request = request.validate()?;
    let user_id = user.map(|AuthUser(u)| u.id);
    let feedback = state.feedback.create(request, user_id).await?;
    info!(feedback_id = %feedback.id, kind = %feedback.kind, "Feedback received");
    Ok((StatusCode::CREATED, Json(feedback)))
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedbackQuery {
    pub status: Option<FeedbackStatus>,
    pub kind: Option<FeedbackKind>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/feedback
pub async fn list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<FeedbackQuery>,
) -> Result<Json<Page<Feedback>>, ApiError> {
    let filter = FeedbackFilter {
        status: query.status,
        kind: query.kind,
    };
    let page = state
        .feedback
        .list(&filter, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(Json(page))
}

/// PUT /api/feedback/:id/status
pub async fn set_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<FeedbackStatusRequest>,
) -> Result<Json<Feedback>, ApiError> {
    let feedback = state.feedback.set_status(id, request.status).await?;
    info!(feedback_id = %id, admin_id = %admin.id, status = %feedback.status, "Feedback status changed");
    Ok(Json(feedback))
}
