// Success stories: public submissions, moderated before publication

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::extract::ValidJson;
use crate::api::responses::{ApiError, MessageResponse};
use crate::api::AppState;
use crate::auth::auth_middleware::{AdminUser, AuthUser};
use crate::core::errors::AppError;
use crate::core::models::{ReviewStatus, SuccessStory};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::{StoryRequest, StoryReviewRequest};
use crate::store::StoryFilter;

/// POST /api/success-stories
pub async fn create(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    ValidJson(request): ValidJson<StoryRequest>,
) -> Result<(StatusCode, Json<SuccessStory>), ApiError> {
    let request = request.validate()?;
    if let Some(program_id) = request.program_id {
        if state.programs.find(program_id).await?.is_none() {
            return Err(AppError::NotFound("Program".to_string()).into());
        }
    }

    let submitted_by = user.map(|AuthUser(u)| u.id);
    let story = state.stories.create(request, submitted_by).await?;
    info!(story_id = %story.id, "Success story submitted for review");
    state.notifier.story_received(&story);

    Ok((StatusCode::CREATED, Json(story)))
}

#[derive(Debug, Default, Deserialize)]
pub struct StoryQuery {
    pub status: Option<ReviewStatus>,
    pub featured: Option<bool>,
    pub program_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/success-stories
///
/// Visitors only ever see approved stories; administrators may filter by
/// any status.
pub async fn list(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Query(query): Query<StoryQuery>,
) -> Result<Json<Page<SuccessStory>>, ApiError> {
    let is_admin = matches!(&user, Some(AuthUser(u)) if u.is_admin());
    let status = if is_admin {
        query.status
    } else {
        Some(ReviewStatus::Approved)
    };

    let filter = StoryFilter {
        status,
        featured: query.featured,
        program_id: query.program_id,
    };
    let page = state
        .stories
        .list(&filter, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(Json(page))
}

/// GET /api/success-stories/:id
pub async fn get(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessStory>, ApiError> {
    let is_admin = matches!(&user, Some(AuthUser(u)) if u.is_admin());
    let story = state
        .stories
        .find(id)
        .await?
        .filter(|story| is_admin || story.is_public())
        .ok_or_else(|| AppError::NotFound("Success story".to_string()))?;
    Ok(Json(story))
}

/// PUT /api/success-stories/:id/review
pub async fn review(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<StoryReviewRequest>,
) -> Result<Json<SuccessStory>, ApiError> {
    let request = request.validate()?;
    let story = state.stories.review(id, request.status, request.featured).await?;
    info!(
        story_id = %id,
        admin_id = %admin.id,
        status = %story.status,
        featured = story.featured,
        "Success story reviewed"
    );
    Ok(Json(story))
}

/// DELETE /api/success-stories/:id
pub async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.stories.delete(id).await? {
        return Err(AppError::NotFound("Success story".to_string()).into());
    }
    info!(story_id = %id, admin_id = %admin.id, "Success story deleted");
    Ok(MessageResponse::new("Success story deleted successfully"))
}
