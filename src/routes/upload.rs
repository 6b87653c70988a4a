use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::routes::AppState;
use crate::services::chunk_assembler::{ChunkAck, CreatedSession, SessionStatus};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateUploadRequest {
    pub filename: String,
    pub total_size: i64,
}

fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

#[utoipa::path(
    post,
    path = "/uploads",
    tag = "Chunked Upload",
    request_body = CreateUploadRequest,
    responses(
        (status = 201, description = "Upload session created", body = CreatedSession),
        (status = 400, description = "Invalid filename or size")
    )
)]
pub async fn create_upload(
    State(state): State<AppState>,
    Json(payload): Json<CreateUploadRequest>,
) -> Result<(StatusCode, Json<CreatedSession>), AppError> {
    let created = state
        .assembler
        .create_session(&payload.filename, payload.total_size)
        .await?;

    info!(upload_token = %created.upload_token, "POST /uploads | res=201");
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/uploads/{token}/chunks",
    tag = "Chunked Upload",
    params(("token" = String, Path, description = "Upload token")),
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Chunk merged", body = ChunkAck),
        (status = 400, description = "Missing chunk or offset"),
        (status = 404, description = "Unknown upload token"),
        (status = 409, description = "Session no longer accepts chunks")
    )
)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path(token): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ChunkAck>, AppError> {
    let mut chunk = None;
    let mut offset = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::Validation("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "chunk" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::Validation("Failed to read chunk bytes".to_string()))?;
                chunk = Some(data);
            }
            "offset" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|_| AppError::Validation("Failed to read offset".to_string()))?;
                let parsed = raw.trim().parse::<u64>().map_err(|_| {
                    AppError::Validation(format!("offset must be a non-negative integer, got '{}'", raw))
                })?;
                offset = Some(parsed);
            }
            _ => {}
        }
    }

    let (Some(chunk), Some(offset)) = (chunk, offset) else {
        return Err(AppError::Validation("chunk and offset are required".to_string()));
    };

    let ack = state
        .assembler
        .upload_chunk(&token, &chunk, offset, chunk.len() as u64)
        .await?;

    Ok(Json(ack))
}

#[utoipa::path(
    get,
    path = "/uploads/{token}",
    tag = "Chunked Upload",
    params(("token" = String, Path, description = "Upload token")),
    responses(
        (status = 200, description = "Upload progress", body = SessionStatus),
        (status = 404, description = "Unknown upload token")
    )
)]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SessionStatus>, AppError> {
    Ok(Json(state.assembler.get_status(&token).await?))
}

#[utoipa::path(
    post,
    path = "/uploads/{token}/complete",
    tag = "Chunked Upload",
    params(("token" = String, Path, description = "Upload token")),
    responses(
        (status = 200, description = "Assembled file", content_type = "application/octet-stream"),
        (status = 400, description = "Assembled file unavailable"),
        (status = 404, description = "Unknown upload token"),
        (status = 409, description = "Not every byte has been uploaded")
    )
)]
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let file = state.assembler.complete_upload(&token).await?;

    info!(upload_token = %token, filename = %file.filename, size = file.len(), "POST /uploads/complete | res=200");
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_DISPOSITION, content_disposition(&file.filename)),
    ];
    Ok((headers, file.into_bytes()).into_response())
}

#[utoipa::path(
    post,
    path = "/uploads/{token}/fail",
    tag = "Chunked Upload",
    params(("token" = String, Path, description = "Upload token")),
    responses(
        (status = 200, description = "Session marked failed", body = SessionStatus),
        (status = 404, description = "Unknown upload token"),
        (status = 409, description = "Session already completed")
    )
)]
pub async fn fail_upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SessionStatus>, AppError> {
    Ok(Json(state.assembler.fail_upload(&token).await?))
}

#[utoipa::path(
    post,
    path = "/uploads/{token}/cancel",
    tag = "Chunked Upload",
    params(("token" = String, Path, description = "Upload token")),
    responses(
        (status = 200, description = "Session cancelled", body = SessionStatus),
        (status = 404, description = "Unknown upload token"),
        (status = 409, description = "Session already completed")
    )
)]
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SessionStatus>, AppError> {
    Ok(Json(state.assembler.cancel_upload(&token).await?))
}

#[utoipa::path(
    delete,
    path = "/uploads/{token}",
    tag = "Chunked Upload",
    params(("token" = String, Path, description = "Upload token")),
    responses(
        (status = 204, description = "Session and blobs removed")
    )
)]
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AppError> {
    state.assembler.cleanup_upload(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}
