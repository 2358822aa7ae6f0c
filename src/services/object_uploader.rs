//! Remote object storage for processed videos.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, meta::region::RegionProviderChain};
use aws_sdk_s3::{Client, primitives::ByteStream};
use std::{path::Path, time::Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("reading local file for upload: {0}")]
    Source(String),
    #[error("object store rejected upload: {0}")]
    Remote(String),
}

#[async_trait]
pub trait ObjectUploader: Send + Sync {
    /// Stream the file at `path` to `bucket`/`key`.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), UploadError>;
}

/// S3 (or S3-compatible) uploader. The SDK client is cheap to clone and safe
/// to share across requests.
#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
}

impl S3Uploader {
    /// Build a client from the ambient AWS credential chain.
    ///
    /// With `endpoint_url` set (MinIO and friends) path-style addressing is
    /// forced.
    pub async fn new(region: String, endpoint_url: Option<String>) -> Self {
        let region_provider = RegionProviderChain::first_try(aws_config::Region::new(region));
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let client = match endpoint_url {
            Some(endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(&config)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(&config),
        };

        Self { client }
    }
}

#[async_trait]
impl ObjectUploader for S3Uploader {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), UploadError> {
        let start = Instant::now();
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| UploadError::Source(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %aws_sdk_s3::error::DisplayErrorContext(&e),
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                UploadError::Remote(e.to_string())
            })?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );
        Ok(())
    }
}
