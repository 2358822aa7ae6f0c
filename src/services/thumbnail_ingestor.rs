//! Thumbnail uploads: allow-list the image type, hand the bytes to the
//! configured [`ThumbnailStore`], point the record at the new URL, then drop
//! the image it replaced.
//!
//! The whole sequence runs under a per-video lock, so concurrent uploads for
//! one video leave exactly one image and the record always names it.

use crate::{
    models::{
        media::{self, THUMBNAIL_TYPES},
        video::Video,
    },
    services::{
        thumbnail_store::{Thumbnail, ThumbnailStore},
        video_store::{StoreError, VideoStore},
    },
};
use bytes::Bytes;
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Lock stripes; videos hashing to the same stripe share a lock.
const LOCK_STRIPES: usize = 64;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("unsupported media type `{0}`")]
    UnsupportedMediaType(String),
    #[error("storing thumbnail: {0}")]
    Storage(#[from] io::Error),
    #[error("recording thumbnail: {0}")]
    Record(#[from] StoreError),
}

#[derive(Clone)]
pub struct ThumbnailIngestor {
    store: Arc<dyn ThumbnailStore>,
    videos: Arc<dyn VideoStore>,
    locks: Arc<[Mutex<()>]>,
}

impl ThumbnailIngestor {
    pub fn new(store: Arc<dyn ThumbnailStore>, videos: Arc<dyn VideoStore>) -> Self {
        Self {
            store,
            videos,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ThumbnailStore> {
        &self.store
    }

    fn lock_for(&self, video_id: Uuid) -> &Mutex<()> {
        &self.locks[(video_id.as_u128() % LOCK_STRIPES as u128) as usize]
    }

    /// Validate a declared content type; returns the normalized media type.
    pub fn accept_content_type(declared: &str) -> Result<String, ThumbnailError> {
        match media::media_type(declared) {
            Some(mt) if THUMBNAIL_TYPES.contains(&mt.as_str()) => Ok(mt),
            _ => Err(ThumbnailError::UnsupportedMediaType(declared.to_string())),
        }
    }

    /// Store `data` as the thumbnail of `video_id` and return the updated
    /// record. Ownership is checked by the caller; `owner_id` is only
    /// recorded on the span.
    #[tracing::instrument(
        skip(self, data, owner_id),
        fields(owner = %owner_id, bytes = data.len())
    )]
    pub async fn ingest(
        &self,
        video_id: Uuid,
        owner_id: Uuid,
        data: Bytes,
        declared_content_type: &str,
    ) -> Result<Video, ThumbnailError> {
        let media_type = Self::accept_content_type(declared_content_type)?;
        let extension = media::extension_for(&media_type).to_string();

        let _guard = self.lock_for(video_id).lock().await;
        let url = self
            .store
            .put(
                video_id,
                &extension,
                Thumbnail {
                    media_type,
                    data,
                },
            )
            .await?;

        let video = match self.videos.set_thumbnail_url(video_id, &url).await {
            Ok(video) => video,
            Err(err) => {
                if let Err(cleanup) = self.store.discard(video_id, &url).await {
                    warn!(error = %cleanup, %url, "failed to discard unrecorded thumbnail");
                }
                return Err(err.into());
            }
        };

        // The record is already correct; a failed prune only leaves a stray file.
        if let Err(err) = self.store.retain(video_id, &url).await {
            warn!(error = %err, "failed to remove superseded thumbnails");
        }
        info!(%url, "thumbnail stored");
        Ok(video)
    }
}
