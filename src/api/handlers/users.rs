// Account dashboard and user administration

use axum::{
    extract::{Path, Query, State},
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
use crate::core::models::{User, UserRole};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::{ActiveRequest, RoleRequest};
use crate::core::stats::UserDashboard;
use crate::store::{DonationFilter, DonorKey, UserFilter, VolunteerFilter};

const DASHBOARD_ITEMS: i64 = 5;

/// GET /api/users/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserDashboard>, ApiError> {
    let donor = DonorKey::from(&user);
    let donation_filter = DonationFilter {
        donor: Some(donor.clone()),
        ..Default::default()
    };
    let volunteer_filter = VolunteerFilter {
        email: Some(user.email.clone()),
        ..Default::default()
    };
    let first_page = PageRequest::new(Some(1), Some(DASHBOARD_ITEMS));

    let (summary, donations, applications) = tokio::try_join!(
        state.donations.donor_summary(&donor),
        state.donations.list(&donation_filter, first_page),
        state.volunteers.list(&volunteer_filter, first_page),
    )?;

    Ok(Json(UserDashboard {
        summary,
        recent_donations: donations.items,
        volunteer_applications: applications.items,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/users
pub async fn list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<Page<User>>, ApiError> {
    let filter = UserFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        role: query.role,
    };
    let page = state
        .users
        .list(&filter, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(Json(page))
}

/// PUT /api/users/:id/role
pub async fn set_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<RoleRequest>,
) -> Result<Json<User>, ApiError> {
    if id == admin.id && request.role != UserRole::Admin {
        return Err(AppError::BadRequest("You cannot remove your own admin role".to_string()).into());
    }
    let user = state.users.set_role(id, request.role).await?;
    info!(user_id = %id, admin_id = %admin.id, role = %user.role, "User role changed");
    Ok(Json(user))
}

/// PUT /api/users/:id/active
pub async fn set_active(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<ActiveRequest>,
) -> Result<Json<User>, ApiError> {
    if id == admin.id && !request.is_active {
        return Err(AppError::BadRequest("You cannot deactivate your own account".to_string()).into());
    }
    let user = state.users.set_active(id, request.is_active).await?;
    info!(user_id = %id, admin_id = %admin.id, is_active = user.is_active, "User activation changed");
    Ok(Json(user))
}
