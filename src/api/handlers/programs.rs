// Program listings and administration

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::extract::ValidJson;
use crate::api::responses::{ApiError, MessageResponse};
use crate::api::AppState;
use crate::auth::auth_middleware::AdminUser;
use crate::core::errors::AppError;
use crate::core::models::{ProgramCategory, ProgramStatus, ProgramView};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::{ProgramPatch, ProgramRequest};
use crate::store::ProgramFilter;

#[derive(Debug, Default, Deserialize)]
pub struct ProgramQuery {
    pub category: Option<ProgramCategory>,
    pub status: Option<ProgramStatus>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/programs
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ProgramQuery>,
) -> Result<Json<Page<ProgramView>>, ApiError> {
    let filter = ProgramFilter {
        category: query.category,
        status: query.status,
        featured: query.featured,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let page = state
        .programs
        .list(&filter, PageRequest::new(query.page, query.limit))
        .await?;

    let now = Utc::now();
    Ok(Json(page.map(|program| ProgramView::new(program, now))))
}

/// GET /api/programs/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProgramView>, ApiError> {
    let program = state
        .programs
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Program".to_string()))?;
    Ok(Json(ProgramView::new(program, Utc::now())))
}

/// POST /api/programs
pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(request): ValidJson<ProgramRequest>,
) -> Result<(StatusCode, Json<ProgramView>), ApiError> {
    let request = request.validate()?;
    let program = state.programs.create(request, Some(admin.id)).await?;
    info!(program_id = %program.id, admin_id = %admin.id, "Program created");
    Ok((StatusCode::CREATED, Json(ProgramView::new(program, Utc::now()))))
}

/// PUT /api/programs/:id
pub async fn update(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(patch): ValidJson<ProgramPatch>,
) -> Result<Json<ProgramView>, ApiError> {
    let patch = patch.validate()?;
    let mut program = state
        .programs
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Program".to_string()))?;

    patch.apply_to(&mut program)?;
    let program = state.programs.update(&program).await?;
    info!(program_id = %program.id, admin_id = %admin.id, "Program updated");
    Ok(Json(ProgramView::new(program, Utc::now())))
}

/// DELETE /api/programs/:id
pub async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.programs.delete(id).await? {
        return Err(AppError::NotFound("Program".to_string()).into());
    }
    info!(program_id = %id, admin_id = %admin.id, "Program deleted");
    Ok(MessageResponse::new("Program deleted successfully"))
}
