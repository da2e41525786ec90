//! Retrieval gateway handlers.
//!
//! Nothing here streams bytes: playback goes through short-lived
//! presigned URLs so the object store serves the video directly.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Prefix under which uploaded videos are keyed.
const VIDEO_PREFIX: &str = "videos/";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUrlQuery {
    pub file_name: Option<String>,
}

#[derive(Serialize)]
pub struct VideoUrlResponse {
    pub url: String,
}

/// Presigned playback URL for a stored video.
pub async fn get_video_url(
    State(state): State<AppState>,
    Query(query): Query<VideoUrlQuery>,
) -> ApiResult<Json<VideoUrlResponse>> {
    let key = match query.file_name.as_deref() {
        Some(k) if !k.is_empty() => k,
        _ => return Err(ApiError::bad_request("Missing 'fileName' query parameter")),
    };

    // Refuse to sign URLs for keys that do not exist
    if !state.storage.exists(key).await? {
        return Err(ApiError::not_found(format!("No video stored at '{key}'")));
    }

    let url = state
        .storage
        .presign_get(key, state.config.presign_ttl)
        .await?;

    Ok(Json(VideoUrlResponse { url }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    pub key: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<u64>,
}

#[derive(Serialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoItem>,
}

/// List every stored video.
pub async fn list_videos(State(state): State<AppState>) -> ApiResult<Json<VideoListResponse>> {
    let objects = state.storage.list_objects(VIDEO_PREFIX).await?;

    let videos = objects
        .into_iter()
        .map(|o| VideoItem {
            key: o.key,
            size: o.size,
            last_modified: o.last_modified,
        })
        .collect();

    Ok(Json(VideoListResponse { videos }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVideoRequest {
    pub file_name: String,
}

#[derive(Serialize)]
pub struct DeleteVideoResponse {
    pub message: String,
}

/// Delete a stored video.
pub async fn delete_video(
    State(state): State<AppState>,
    payload: Result<Json<DeleteVideoRequest>, JsonRejection>,
) -> ApiResult<Json<DeleteVideoResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    if request.file_name.is_empty() {
        return Err(ApiError::bad_request("Missing 'fileName'"));
    }

    state.storage.delete_object(&request.file_name).await?;
    info!(key = %request.file_name, "Video deleted");

    Ok(Json(DeleteVideoResponse {
        message: "Video deleted".to_string(),
    }))
}
