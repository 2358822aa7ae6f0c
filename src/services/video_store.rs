//! Content-record persistence.
//!
//! `VideoStore` is the seam the HTTP layer and pipeline talk to;
//! `SqliteVideoStore` keeps records in the `videos` table.

use crate::models::video::{CreateVideoParams, Video};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("video `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn create(&self, params: CreateVideoParams) -> StoreResult<Video>;
    async fn get(&self, id: Uuid) -> StoreResult<Video>;
    /// Point the record at a newly published video; returns the stored row.
    async fn set_video_url(&self, id: Uuid, url: &str) -> StoreResult<Video>;
    /// Point the record at a newly stored thumbnail; returns the stored row.
    async fn set_thumbnail_url(&self, id: Uuid, url: &str) -> StoreResult<Video>;
}

const VIDEO_COLUMNS: &str =
    "id, created_at, updated_at, thumbnail_url, video_url, title, description, user_id";

#[derive(Clone)]
pub struct SqliteVideoStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteVideoStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VideoStore for SqliteVideoStore {
    async fn create(&self, params: CreateVideoParams) -> StoreResult<Video> {
        let now = Utc::now();
        let video = Video {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            thumbnail_url: None,
            video_url: None,
            params,
        };

        sqlx::query(
            "INSERT INTO videos (id, created_at, updated_at, thumbnail_url, video_url,
                                 title, description, user_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(video.id)
        .bind(video.created_at)
        .bind(video.updated_at)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .bind(&video.params.title)
        .bind(&video.params.description)
        .bind(video.params.user_id)
        .execute(&*self.db)
        .await?;

        Ok(video)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Video> {
        sqlx::query_as::<_, Video>(&format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?"))
            .bind(id)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StoreError::NotFound(id),
                other => StoreError::Sqlx(other),
            })
    }

    async fn set_video_url(&self, id: Uuid, url: &str) -> StoreResult<Video> {
        self.set_url_column("video_url", id, url).await
    }

    async fn set_thumbnail_url(&self, id: Uuid, url: &str) -> StoreResult<Video> {
        self.set_url_column("thumbnail_url", id, url).await
    }
}

impl SqliteVideoStore {
    /// Rewrite one URL column and `updated_at`, returning the row as stored.
    /// Every other column keeps whatever a concurrent writer left there.
    async fn set_url_column(
        &self,
        column: &'static str,
        id: Uuid,
        url: &str,
    ) -> StoreResult<Video> {
        sqlx::query_as::<_, Video>(&format!(
            "UPDATE videos SET {column} = ?, updated_at = ? WHERE id = ? RETURNING {VIDEO_COLUMNS}"
        ))
        .bind(url)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(StoreError::NotFound(id))
    }
}

/// Apply the embedded schema. Statements are idempotent.
pub async fn apply_schema(db: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

pub const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Single-connection in-memory pool with the schema applied.
    pub async fn memory_pool() -> Arc<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        Arc::new(pool)
    }
}
