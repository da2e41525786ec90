//! Upload handlers.
//!
//! `POST /upload/video` takes a whole file in one request; the chunk
//! endpoint feeds the session coordinator one part at a time. Both speak
//! multipart/form-data with camelCase field names, matching the web
//! client.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use vidgate_upload::{derive_object_key, ChunkOutcome, ChunkRequest};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Response for a single-shot upload.
#[derive(Serialize)]
pub struct UploadVideoResponse {
    pub message: String,
    pub url: String,
}

/// Single-shot video upload (field `file`).
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadVideoResponse>> {
    let mut file: Option<(String, String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("unnamed").to_string();
            let content_type = field
                .content_type()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read file field: {e}")))?;
            file = Some((file_name, content_type, data));
        }
    }

    let Some((file_name, content_type, data)) = file else {
        return Err(ApiError::bad_request("Missing 'file' field"));
    };
    if data.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    let key = derive_object_key(&file_name);
    let size = data.len();
    let location = state.storage.put_object(&key, data, &content_type).await?;
    let url = state
        .storage
        .presign_get(&location.key, state.config.presign_ttl)
        .await?;

    metrics::record_upload_completed();
    info!(key = %location.key, size, "Single-shot upload stored");

    Ok(Json(UploadVideoResponse {
        message: "Upload successful".to_string(),
        url,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAcceptedResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct UploadCompleteResponse {
    pub message: String,
    pub key: String,
}

/// One chunk of a multipart upload.
///
/// Fields: `fileName`, `mimeType` (optional), `partNumber`, `totalParts`,
/// `sessionId` (absent on the first chunk), binary field `chunk`.
pub async fn upload_video_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut file_name: Option<String> = None;
    let mut mime_type: Option<String> = None;
    let mut part_number: Option<u32> = None;
    let mut total_parts: Option<u32> = None;
    let mut session_id: Option<String> = None;
    let mut payload: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(|s| s.to_string()) else {
            continue;
        };

        match name.as_str() {
            "fileName" => file_name = Some(text_field(field, &name).await?),
            "mimeType" => mime_type = Some(text_field(field, &name).await?),
            "partNumber" => part_number = Some(numeric_field(field, &name).await?),
            "totalParts" => total_parts = Some(numeric_field(field, &name).await?),
            "sessionId" => {
                let value = text_field(field, &name).await?;
                if !value.is_empty() {
                    session_id = Some(value);
                }
            }
            "chunk" => {
                if mime_type.is_none() {
                    mime_type = field.content_type().map(|s| s.to_string());
                }
                let data = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read chunk field: {e}"))
                })?;
                payload = Some(data);
            }
            _ => {}
        }
    }

    let file_name = file_name.ok_or_else(|| ApiError::bad_request("Missing 'fileName' field"))?;
    let part_number =
        part_number.ok_or_else(|| ApiError::bad_request("Missing 'partNumber' field"))?;
    let total_parts =
        total_parts.ok_or_else(|| ApiError::bad_request("Missing 'totalParts' field"))?;
    let payload = payload.ok_or_else(|| ApiError::bad_request("Missing 'chunk' field"))?;

    let chunk_size = payload.len();
    let request = ChunkRequest {
        file_name,
        content_type: mime_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        part_number,
        total_parts,
        payload,
        session_id,
    };

    let outcome = state.coordinator.submit_chunk(request).await.map_err(|e| {
        if !e.is_client_error() {
            metrics::record_upload_failed();
        }
        metrics::set_active_sessions(state.coordinator.session_count());
        ApiError::from(e)
    })?;

    metrics::set_active_sessions(state.coordinator.session_count());

    match outcome {
        ChunkOutcome::Accepted { session_id } => {
            metrics::record_chunk_accepted(chunk_size);
            Ok(Json(ChunkAcceptedResponse {
                session_id,
                status: "chunk accepted".to_string(),
            })
            .into_response())
        }
        ChunkOutcome::Completed { key, .. } => {
            metrics::record_chunk_accepted(chunk_size);
            metrics::record_upload_completed();
            Ok(Json(UploadCompleteResponse {
                message: "Upload complete".to_string(),
                key,
            })
            .into_response())
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelUploadRequest {
    pub session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelUploadResponse {
    pub message: String,
    pub session_id: String,
}

/// Explicitly cancel an in-flight upload session.
pub async fn cancel_upload(
    State(state): State<AppState>,
    payload: Result<Json<CancelUploadRequest>, JsonRejection>,
) -> ApiResult<Json<CancelUploadResponse>> {
    // A missing or malformed body is the caller's fault, same as any
    // other bad parameter
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    if request.session_id.is_empty() {
        return Err(ApiError::bad_request("Missing 'sessionId'"));
    }

    state.coordinator.abort_session(&request.session_id).await?;

    metrics::record_upload_aborted();
    metrics::set_active_sessions(state.coordinator.session_count());

    Ok(Json(CancelUploadResponse {
        message: "Upload session aborted".to_string(),
        session_id: request.session_id,
    }))
}

async fn text_field(field: axum::extract::multipart::Field<'_>, name: &str) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read '{name}' field: {e}")))
}

async fn numeric_field(field: axum::extract::multipart::Field<'_>, name: &str) -> ApiResult<u32> {
    let text = text_field(field, name).await?;
    text.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Field '{name}' must be a positive integer")))
}
