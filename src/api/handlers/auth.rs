// Registration, login and the signed-in user's account

use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use tracing::info;

use crate::api::extract::{ClientInfo, ValidJson};
use crate::api::responses::{ApiError, AuthResponse, MessageResponse};
use crate::api::AppState;
use crate::auth::audit_logger::{AuthContext, AuthEvent};
use crate::auth::auth_middleware::AuthUser;
use crate::auth::password::{hash_password, verify_password};
use crate::core::errors::AppError;
use crate::core::models::{User, UserRole};
use crate::core::requests::{ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest};
use crate::store::NewUser;

fn audit_context(client: &ClientInfo, user_id: Option<uuid::Uuid>, email: &str) -> AuthContext {
    AuthContext {
        user_id,
        email: Some(email.to_string()),
        ip_address: client.ip.clone(),
        user_agent: client.user_agent.clone(),
    }
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidJson(request): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let request = request.validate()?;
    let password_hash = hash_password(&request.password).await?;

    let user = state
        .users
        .create(NewUser {
            name: request.name,
            email: request.email,
            password_hash,
            role: UserRole::User,
            phone: request.phone,
        })
        .await?;
    let token = state.tokens.issue(&user)?;

    state
        .audit_logger
        .log_auth_event(AuthEvent::Register, audit_context(&client, Some(user.id), &user.email));
    info!(user_id = %user.id, "User registered");

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// POST /api/auth/login
///
/// Unknown email and wrong password answer identically.
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let request = request.validate()?;
    let fail = |reason: &str, user_id| {
        state.audit_logger.log_auth_event(
            AuthEvent::LoginFailure {
                reason: reason.to_string(),
            },
            audit_context(&client, user_id, &request.email),
        );
    };

    let Some(mut user) = state.users.find_by_email(&request.email).await? else {
        fail("Unknown email", None);
        return Err(AppError::InvalidCredentials.into());
    };

    if !verify_password(&request.password, &user.password_hash).await? {
        fail("Invalid password", Some(user.id));
        return Err(AppError::InvalidCredentials.into());
    }

    if !user.is_active {
        fail("Account deactivated", Some(user.id));
        return Err(AppError::Forbidden("Account is deactivated".to_string()).into());
    }

    state.users.record_login(user.id).await?;
    user.last_login_at = Some(Utc::now());
    let token = state.tokens.issue(&user)?;

    state
        .audit_logger
        .log_auth_event(AuthEvent::LoginSuccess, audit_context(&client, Some(user.id), &user.email));

    Ok(Json(AuthResponse { token, user }))
}

/// GET /api/auth/me
pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidJson(request): ValidJson<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let request = request.validate()?;
    let updated = state
        .users
        .update_profile(user.id, request.name, request.phone)
        .await?;
    Ok(Json(updated))
}

/// PUT /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidJson(request): ValidJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = request.validate()?;

    if !verify_password(&request.current_password, &user.password_hash).await? {
        return Err(AppError::invalid_field("current_password", "Current password is incorrect").into());
    }

    let password_hash = hash_password(&request.new_password).await?;
    state.users.update_password(user.id, &password_hash).await?;
    info!(user_id = %user.id, "Password changed");

    Ok(MessageResponse::new("Password updated successfully"))
}
