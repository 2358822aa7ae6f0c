//! Shared handler state.

use crate::services::{
    auth::Authenticator, thumbnail_ingestor::ThumbnailIngestor, upload_pipeline::UploadPipeline,
    video_store::VideoStore,
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// Upload ceilings enforced at the HTTP layer.
#[derive(Clone, Copy, Debug)]
pub struct UploadLimits {
    pub max_video_bytes: u64,
    pub max_thumbnail_bytes: u64,
}

/// Everything a handler needs. Each collaborator is safe for concurrent use,
/// so cloning the state per request only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub videos: Arc<dyn VideoStore>,
    pub auth: Arc<dyn Authenticator>,
    pub pipeline: Arc<UploadPipeline>,
    pub thumbnails: ThumbnailIngestor,
    pub assets_root: PathBuf,
    pub limits: UploadLimits,
}
