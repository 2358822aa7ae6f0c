//! Thumbnail persistence, one image per video id.
//!
//! Two backends:
//! - [`LocalThumbnailStore`] writes `{video_id}-{random}.{ext}` under the
//!   assets root and serves it from `/assets`. Survives restarts.
//! - [`MemoryThumbnailStore`] keeps bytes in a lock-guarded map and serves
//!   them from `/api/thumbnails/{video_id}`.
//!
//! Storing is two-phase: `put` adds the new image next to any earlier one,
//! and `retain` drops the earlier ones once the record points at the new
//! URL. Callers serialize both phases per video.

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::PathBuf,
};
use tokio::{fs, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// An image and its media type.
#[derive(Clone, Debug, PartialEq)]
pub struct Thumbnail {
    pub media_type: String,
    pub data: Bytes,
}

#[async_trait]
pub trait ThumbnailStore: Send + Sync {
    /// Store `thumbnail` for `video_id` and return its URL. Earlier images
    /// for the video are left in place.
    async fn put(
        &self,
        video_id: Uuid,
        extension: &str,
        thumbnail: Thumbnail,
    ) -> io::Result<String>;

    /// Remove every image of `video_id` except the one served at `url`.
    async fn retain(&self, video_id: Uuid, url: &str) -> io::Result<()>;

    /// Remove the image served at `url`, if it belongs to `video_id`.
    async fn discard(&self, video_id: Uuid, url: &str) -> io::Result<()>;

    /// The current image for `video_id`, if this backend serves bytes itself.
    async fn get(&self, video_id: Uuid) -> io::Result<Option<Thumbnail>>;
}

pub struct LocalThumbnailStore {
    root: PathBuf,
    base_url: String,
}

impl LocalThumbnailStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    fn prefix(video_id: Uuid) -> String {
        format!("{}-", video_id)
    }

    /// Files currently stored for `video_id`.
    async fn files_for(&self, video_id: Uuid) -> io::Result<Vec<(String, PathBuf)>> {
        let prefix = Self::prefix(video_id);
        let mut found = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(found),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) {
                found.push((name, entry.path()));
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl ThumbnailStore for LocalThumbnailStore {
    async fn put(
        &self,
        video_id: Uuid,
        extension: &str,
        thumbnail: Thumbnail,
    ) -> io::Result<String> {
        fs::create_dir_all(&self.root).await?;

        // Fresh name per upload so caches never serve a stale image.
        let token: [u8; 16] = rand::rng().random();
        let file_name = format!("{}{}.{}", Self::prefix(video_id), hex::encode(token), extension);
        let final_path = self.root.join(&file_name);
        let tmp_path = self.root.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = fs::write(&tmp_path, &thumbnail.data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), file_name))
    }

    async fn retain(&self, video_id: Uuid, url: &str) -> io::Result<()> {
        let keep = file_name_of(url);
        for (name, path) in self.files_for(video_id).await? {
            if name == keep {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(_) => debug!("removed superseded thumbnail {}", name),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn discard(&self, video_id: Uuid, url: &str) -> io::Result<()> {
        let name = file_name_of(url);
        if !name.starts_with(&Self::prefix(video_id)) {
            return Ok(());
        }
        match fs::remove_file(self.root.join(name)).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    async fn get(&self, video_id: Uuid) -> io::Result<Option<Thumbnail>> {
        let Some((name, path)) = self.files_for(video_id).await?.into_iter().next() else {
            return Ok(None);
        };
        let data = fs::read(&path).await?;
        Ok(Some(Thumbnail {
            media_type: media_type_for_file(&name).to_string(),
            data: Bytes::from(data),
        }))
    }
}

/// Last path segment of a thumbnail URL.
fn file_name_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Media type for a stored asset, by extension.
pub fn media_type_for_file(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpeg" || ext == "jpg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

pub struct MemoryThumbnailStore {
    public_base_url: String,
    thumbnails: RwLock<HashMap<Uuid, Thumbnail>>,
}

impl MemoryThumbnailStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            thumbnails: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.thumbnails.read().await.len()
    }
}

#[async_trait]
impl ThumbnailStore for MemoryThumbnailStore {
    async fn put(
        &self,
        video_id: Uuid,
        _extension: &str,
        thumbnail: Thumbnail,
    ) -> io::Result<String> {
        self.thumbnails.write().await.insert(video_id, thumbnail);
        Ok(format!(
            "{}/api/thumbnails/{}",
            self.public_base_url.trim_end_matches('/'),
            video_id
        ))
    }

    // One entry per video; `put` already replaced the previous image.
    async fn retain(&self, _video_id: Uuid, _url: &str) -> io::Result<()> {
        Ok(())
    }

    async fn discard(&self, _video_id: Uuid, _url: &str) -> io::Result<()> {
        Ok(())
    }

    async fn get(&self, video_id: Uuid) -> io::Result<Option<Thumbnail>> {
        Ok(self.thumbnails.read().await.get(&video_id).cloned())
    }
}
