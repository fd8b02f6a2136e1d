// Image uploads

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::info;

use crate::api::responses::{ApiError, MessageResponse};
use crate::api::AppState;
use crate::auth::auth_middleware::AdminUser;
use crate::core::errors::AppError;
use crate::infra::uploads::StoredFile;

const FIELD_NAME: &str = "image";

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Uploaded file is too large".to_string())
    } else {
        AppError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// POST /api/upload
pub async fn upload(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StoredFile>), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FIELD_NAME) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let stored = state
            .uploads
            .save(file_name.as_deref(), content_type.as_deref(), &bytes)
            .await?;
        info!(filename = %stored.filename, admin_id = %admin.id, "Upload stored");
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    Err(AppError::BadRequest("No file uploaded; expected an 'image' field".to_string()).into())
}

/// DELETE /api/upload/:filename
pub async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(filename): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.uploads.delete(&filename).await?;
    info!(filename = %filename, admin_id = %admin.id, "Upload removed");
    Ok(MessageResponse::new("File deleted successfully"))
}
