//! HTTP handlers for video records and their uploads.
//!
//! Every mutating handler runs the same gate first: parse the id,
//! authenticate the bearer token, load the record, and require the caller
//! to own it. Only then is the multipart body touched.

use crate::{
    errors::AppError,
    models::video::{CreateVideoParams, Video},
    services::thumbnail_ingestor::ThumbnailIngestor,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tracing::info;
use uuid::Uuid;

/// Multipart framing and headers allowed on top of the payload ceiling.
pub const MULTIPART_OVERHEAD: u64 = 1 << 20;

#[derive(Debug, Deserialize)]
pub struct CreateVideoReq {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// `POST /videos`: create a record owned by the caller.
pub async fn create_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateVideoReq>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = state.auth.validate_bearer_token(&headers)?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let video = state
        .videos
        .create(CreateVideoParams {
            title: title.to_string(),
            description: req.description,
            user_id,
        })
        .await?;
    info!(video_id = %video.id, %user_id, "video record created");
    Ok((StatusCode::CREATED, Json(video)))
}

/// `GET /videos/{video_id}`: the caller's own record.
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Video>, AppError> {
    let (_, video) = authorize_owner(&state, &video_id, &headers).await?;
    Ok(Json(video))
}

/// `POST /videos/{video_id}/video`: multipart field `video`, `video/mp4` only.
pub async fn upload_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Video>, AppError> {
    let (user_id, video) = authorize_owner(&state, &video_id, &headers).await?;
    let limit = state.limits.max_video_bytes;
    reject_oversized(&headers, limit)?;
    let mut multipart = multipart.map_err(|_| AppError::bad_request("unable to parse data"))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, limit))?
    {
        if field.name() != Some("video") {
            continue;
        }

        let declared = field.content_type().unwrap_or_default().to_string();
        let stream = field.map(|chunk| chunk.map_err(io::Error::other));
        let url = state
            .pipeline
            .process(user_id, video.id, stream, &declared, limit)
            .await?;

        // Only the video column is written, so a thumbnail stored while the
        // pipeline ran is kept.
        let updated = state.videos.set_video_url(video.id, &url).await?;
        return Ok(Json(updated));
    }

    Err(AppError::bad_request("missing `video` field"))
}

/// `POST /videos/{video_id}/thumbnail`: multipart field `thumbnail`,
/// `image/jpeg` or `image/png`.
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Video>, AppError> {
    let (user_id, video) = authorize_owner(&state, &video_id, &headers).await?;
    let limit = state.limits.max_thumbnail_bytes;
    reject_oversized(&headers, limit)?;
    let mut multipart = multipart.map_err(|_| AppError::bad_request("unable to parse data"))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, limit))?
    {
        if field.name() != Some("thumbnail") {
            continue;
        }

        let declared = field.content_type().unwrap_or_default().to_string();
        // Check the type before buffering the image.
        ThumbnailIngestor::accept_content_type(&declared)?;
        let data = field
            .bytes()
            .await
            .map_err(|err| multipart_error(err, limit))?;
        if data.len() as u64 > limit {
            return Err(AppError::payload_too_large(limit));
        }

        let updated = state
            .thumbnails
            .ingest(video.id, user_id, data, &declared)
            .await?;
        return Ok(Json(updated));
    }

    Err(AppError::bad_request("missing `thumbnail` field"))
}

/// `GET /api/thumbnails/{video_id}`: serve a thumbnail held by the store.
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Response, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let thumbnail = state
        .thumbnails
        .store()
        .get(video_id)
        .await
        .map_err(|err| AppError::dependency("error reading thumbnail", &err))?
        .ok_or_else(|| AppError::not_found("thumbnail not found"))?;

    let mut response = Response::new(Body::from(thumbnail.data));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&thumbnail.media_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    Ok(response)
}

fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request("invalid video id"))
}

/// Resolve the caller and the record, and require the caller to own it.
async fn authorize_owner(
    state: &AppState,
    raw_id: &str,
    headers: &HeaderMap,
) -> Result<(Uuid, Video), AppError> {
    let video_id = parse_video_id(raw_id)?;
    let user_id = state.auth.validate_bearer_token(headers)?;
    let video = state.videos.get(video_id).await?;
    if !video.is_owned_by(user_id) {
        tracing::warn!(%video_id, %user_id, "caller does not own video");
        return Err(AppError::unauthorized());
    }
    Ok((user_id, video))
}

/// Refuse a declared body larger than the ceiling before reading any of it.
fn reject_oversized(headers: &HeaderMap, limit: u64) -> Result<(), AppError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    match declared {
        Some(len) if len > limit.saturating_add(MULTIPART_OVERHEAD) => {
            Err(AppError::payload_too_large(limit))
        }
        _ => Ok(()),
    }
}

fn multipart_error(err: MultipartError, limit: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large(limit)
    } else {
        tracing::debug!(error = %err.body_text(), "malformed multipart body");
        AppError::bad_request("unable to parse data")
    }
}
