// Volunteer applications

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
use crate::core::errors::AppError;
use crate::core::models::{ReviewStatus, VolunteerApplication};
use crate::core::pagination::{Page, PageParams, PageRequest};
use crate::core::requests::{ReviewRequest, VolunteerRequest};
use crate::store::VolunteerFilter;

/// POST /api/volunteers
pub async fn create(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    ValidJson(request): ValidJson<VolunteerRequest>,
) -> Result<(StatusCode, Json<VolunteerApplication>), ApiError> {
    let request = request.validate()?;

    if let Some(program_id) = request.program_id {
        if state.programs.find(program_id).await?.is_none() {
            return Err(AppError::NotFound("Program".to_string()).into());
        }
    }
    if state.volunteers.has_pending(&request.email, request.program_id).await? {
        return Err(AppError::Conflict(
            "You already have a pending application for this program".to_string(),
        )
        .into());
    }

    let user_id = user.map(|AuthUser(u)| u.id);
    let application = state.volunteers.create(request, user_id).await?;
    info!(application_id = %application.id, "Volunteer application received");
    state.notifier.volunteer_received(&application);

    Ok((StatusCode::CREATED, Json(application)))
}

#[derive(Debug, Default, Deserialize)]
pub struct VolunteerQuery {
    pub status: Option<ReviewStatus>,
    pub program_id: Option<Uuid>,
    pub email: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/volunteers
pub async fn list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<VolunteerQuery>,
) -> Result<Json<Page<VolunteerApplication>>, ApiError> {
    let filter = VolunteerFilter {
        status: query.status,
        program_id: query.program_id,
        email: query.email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()),
        user_id: None,
    };
    let page = state
        .volunteers
        .list(&filter, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(Json(page))
}

/// GET /api/volunteers/mine
///
/// Matched by email so applications sent before registering show up too.
pub async fn mine(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<VolunteerApplication>>, ApiError> {
    let filter = VolunteerFilter {
        email: Some(user.email),
        ..Default::default()
    };
    Ok(Json(state.volunteers.list(&filter, params.into()).await?))
}

/// GET /api/volunteers/:id
pub async fn get(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<VolunteerApplication>, ApiError> {
    let application = state
        .volunteers
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Volunteer application".to_string()))?;
    Ok(Json(application))
}

/// PUT /api/volunteers/:id/status
pub async fn review(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<ReviewRequest>,
) -> Result<Json<VolunteerApplication>, ApiError> {
    let request = request.validate()?;
    let application = state
        .volunteers
        .review(id, request.status, request.admin_notes, admin.id)
        .await?;

    info!(
        application_id = %application.id,
        admin_id = %admin.id,
        status = %application.status,
        "Volunteer application reviewed"
    );
    state.notifier.volunteer_decision(&application);

    Ok(Json(application))
}
