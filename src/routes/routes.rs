//! Defines routes for video records and their uploads.
//!
//! ## Structure
//! - **Probes**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Records**
//!   - `POST /videos`: create a record owned by the caller
//!   - `GET  /videos/{video_id}`: fetch the caller's record
//!
//! - **Uploads** (owner only, multipart)
//!   - `POST /videos/{video_id}/video`: field `video`
//!   - `POST /videos/{video_id}/thumbnail`: field `thumbnail`
//!
//! - **Assets**
//!   - `GET  /assets/{file}`: locally stored thumbnails
//!   - `GET  /api/thumbnails/{video_id}`: thumbnails held in memory

use crate::{
    handlers::{
        asset_handlers::get_asset,
        health_handlers::{healthz, readyz},
        video_handlers::{
            MULTIPART_OVERHEAD, create_video, get_thumbnail, get_video, upload_thumbnail,
            upload_video,
        },
    },
    state::{AppState, UploadLimits},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. Each upload route carries its own body ceiling.
pub fn routes(limits: UploadLimits) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // record routes
        .route("/videos", post(create_video))
        .route("/videos/{video_id}", get(get_video))
        // upload routes
        .route(
            "/videos/{video_id}/video",
            post(upload_video).layer(body_limit(limits.max_video_bytes)),
        )
        .route(
            "/videos/{video_id}/thumbnail",
            post(upload_thumbnail).layer(body_limit(limits.max_thumbnail_bytes)),
        )
        // asset routes
        .route("/assets/{file}", get(get_asset))
        .route("/api/thumbnails/{video_id}", get(get_thumbnail))
}

fn body_limit(limit: u64) -> DefaultBodyLimit {
    let max = limit.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(max).unwrap_or(usize::MAX))
}
