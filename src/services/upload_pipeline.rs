//! The video upload pipeline.
//!
//! `process` turns an incoming body into a published, fast-start video:
//!
//! 1. allow-list the declared media type (`video/mp4` only)
//! 2. stage the body to a temp file under a byte ceiling, then rewind
//! 3. probe geometry and bucket it into an [`AspectClass`]
//! 4. remux for progressive playback (stream copy)
//! 5. generate a random key in the aspect namespace
//! 6. upload the remuxed file
//! 7. return `{distribution_base}/{key}`
//!
//! Any failure aborts the run. Nothing is written remotely before step 6,
//! and both temp files are removed on every exit path. Persisting the
//! returned URL is the caller's job; a crash between upload and that write
//! leaves an orphaned object in the bucket.

use crate::{
    models::media::{self, AspectClass, VIDEO_MP4},
    services::{
        keygen,
        media_probe::{MediaInspector, ProbeError},
        object_uploader::{ObjectUploader, UploadError},
        remuxer::{ContainerRemuxer, RemuxError},
        staging::{ScratchFile, StagedUpload, StagingError},
    },
};
use bytes::Bytes;
use futures::Stream;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported media type `{0}`")]
    UnsupportedMediaType(String),
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("upload body could not be read: {0}")]
    Body(#[source] io::Error),
    #[error("staging upload: {0}")]
    Staging(#[source] io::Error),
    #[error("probing upload: {0}")]
    Probe(#[from] ProbeError),
    #[error("remuxing upload: {0}")]
    Remux(#[from] RemuxError),
    #[error("uploading to object storage: {0}")]
    Upload(#[from] UploadError),
}

impl From<StagingError> for PipelineError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::TooLarge { limit } => PipelineError::TooLarge { limit },
            StagingError::Body(err) => PipelineError::Body(err),
            StagingError::Io(err) => PipelineError::Staging(err),
        }
    }
}

/// Wiring for one service instance; cheap to share behind an `Arc`.
pub struct UploadPipeline {
    inspector: Arc<dyn MediaInspector>,
    remuxer: Arc<dyn ContainerRemuxer>,
    uploader: Arc<dyn ObjectUploader>,
    staging_dir: PathBuf,
    bucket: String,
    distribution_base: String,
}

impl UploadPipeline {
    pub fn new(
        inspector: Arc<dyn MediaInspector>,
        remuxer: Arc<dyn ContainerRemuxer>,
        uploader: Arc<dyn ObjectUploader>,
        staging_dir: impl Into<PathBuf>,
        bucket: impl Into<String>,
        distribution_base: impl Into<String>,
    ) -> Self {
        Self {
            inspector,
            remuxer,
            uploader,
            staging_dir: staging_dir.into(),
            bucket: bucket.into(),
            distribution_base: distribution_base.into(),
        }
    }

    /// Validate a declared content type; returns the normalized media type.
    pub fn accept_content_type(declared: &str) -> Result<String, PipelineError> {
        match media::media_type(declared) {
            Some(mt) if mt == VIDEO_MP4 => Ok(mt),
            _ => Err(PipelineError::UnsupportedMediaType(declared.to_string())),
        }
    }

    /// Run the full pipeline and return the public URL of the stored video.
    ///
    /// Ownership is checked by the caller; `owner_id` is only recorded on
    /// the span.
    #[tracing::instrument(
        skip(self, owner_id, stream, size_limit),
        fields(owner = %owner_id, bucket = %self.bucket)
    )]
    pub async fn process<S>(
        &self,
        owner_id: Uuid,
        video_id: Uuid,
        stream: S,
        declared_content_type: &str,
        size_limit: u64,
    ) -> Result<String, PipelineError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let media_type = Self::accept_content_type(declared_content_type)?;
        let extension = media::extension_for(&media_type);

        let mut staged = StagedUpload::create_in(&self.staging_dir, extension).await?;
        let size = staged.write_stream(stream, size_limit).await?;
        staged.rewind().await?;

        let (width, height) = self.inspector.probe(staged.path()).await?;
        let aspect = AspectClass::from_dimensions(width, height).ok_or(
            ProbeError::MissingGeometry {
                width: Some(width),
                height: Some(height),
            },
        )?;
        info!(size, width, height, %aspect, "classified upload");

        let processed = ScratchFile::adopt(self.remuxer.remux(staged.path()).await?);

        let key = keygen::generate(aspect, extension);
        self.uploader
            .upload(&self.bucket, &key, processed.path(), &media_type)
            .await?;

        let url = self.public_url(&key);
        info!(%key, %url, "video published");
        Ok(url)
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.distribution_base.trim_end_matches('/'), key)
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    /// Reports fixed geometry and records the paths it was asked about.
    pub struct FixedInspector {
        pub geometry: Option<(u32, u32)>,
        pub delay: Option<std::time::Duration>,
        pub seen: Mutex<Vec<PathBuf>>,
    }

    impl FixedInspector {
        pub fn geometry(width: u32, height: u32) -> Self {
            Self {
                geometry: Some((width, height)),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                geometry: None,
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        /// Hold each probe for `delay`, like a slow ffprobe run.
        pub fn with_delay(self, delay: std::time::Duration) -> Self {
            Self {
                delay: Some(delay),
                ..self
            }
        }

        pub fn probe_count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MediaInspector for FixedInspector {
        async fn probe(&self, path: &Path) -> Result<(u32, u32), ProbeError> {
            self.seen.lock().unwrap().push(path.to_path_buf());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.geometry.ok_or(ProbeError::NoStreams)
        }
    }

    /// Copies the input to the `.processing` sibling, or fails on demand.
    pub struct CopyRemuxer {
        pub fail: bool,
        pub outputs: Mutex<Vec<PathBuf>>,
    }

    impl CopyRemuxer {
        pub fn ok() -> Self {
            Self {
                fail: false,
                outputs: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                outputs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ContainerRemuxer for CopyRemuxer {
        async fn remux(&self, path: &Path) -> Result<PathBuf, RemuxError> {
            if self.fail {
                let mut cmd = tokio::process::Command::new("false");
                cmd.arg(path);
                let err = crate::services::process::run_with_timeout(
                    cmd,
                    std::time::Duration::from_secs(5),
                )
                .await
                .unwrap_err();
                return Err(err.into());
            }
            let out = crate::services::remuxer::remux_output_path(path);
            tokio::fs::copy(path, &out).await.unwrap();
            self.outputs.lock().unwrap().push(out.clone());
            Ok(out)
        }
    }

    #[derive(Debug, Clone)]
    pub struct PutRecord {
        pub bucket: String,
        pub key: String,
        pub content_type: String,
        pub body: Vec<u8>,
    }

    /// Captures every upload in memory.
    #[derive(Default)]
    pub struct RecordingUploader {
        pub fail: bool,
        pub puts: Mutex<Vec<PutRecord>>,
        pub calls: AtomicUsize,
    }

    impl RecordingUploader {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn put_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectUploader for RecordingUploader {
        async fn upload(
            &self,
            bucket: &str,
            key: &str,
            path: &Path,
            content_type: &str,
        ) -> Result<(), UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(UploadError::Remote("AccessDenied".into()));
            }
            let body = tokio::fs::read(path)
                .await
                .map_err(|e| UploadError::Source(e.to_string()))?;
            self.puts.lock().unwrap().push(PutRecord {
                bucket: bucket.into(),
                key: key.into(),
                content_type: content_type.into(),
                body,
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use futures::stream;

    struct Harness {
        dir: tempfile::TempDir,
        inspector: Arc<FixedInspector>,
        remuxer: Arc<CopyRemuxer>,
        uploader: Arc<RecordingUploader>,
        pipeline: UploadPipeline,
    }

    fn harness(
        inspector: FixedInspector,
        remuxer: CopyRemuxer,
        uploader: RecordingUploader,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let inspector = Arc::new(inspector);
        let remuxer = Arc::new(remuxer);
        let uploader = Arc::new(uploader);
        let pipeline = UploadPipeline::new(
            inspector.clone(),
            remuxer.clone(),
            uploader.clone(),
            dir.path(),
            "clips",
            "https://cdn.example.com/",
        );
        Harness {
            dir,
            inspector,
            remuxer,
            uploader,
            pipeline,
        }
    }

    fn ok_harness(width: u32, height: u32) -> Harness {
        harness(
            FixedInspector::geometry(width, height),
            CopyRemuxer::ok(),
            RecordingUploader::default(),
        )
    }

    fn body(bytes: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(vec![Ok(Bytes::from_static(bytes))])
    }

    fn staging_is_empty(h: &Harness) -> bool {
        std::fs::read_dir(h.dir.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn landscape_upload_is_published_under_landscape() {
        let h = ok_harness(1920, 1080);

        let url = h
            .pipeline
            .process(Uuid::new_v4(), Uuid::new_v4(), body(b"mp4 bytes"), "video/mp4", 1024)
            .await
            .unwrap();

        assert!(url.starts_with("https://cdn.example.com/landscape/"), "{url}");
        assert!(url.ends_with(".mp4"));

        let puts = h.uploader.puts.lock().unwrap().clone();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].bucket, "clips");
        assert_eq!(puts[0].content_type, "video/mp4");
        assert_eq!(puts[0].body, b"mp4 bytes");
        assert_eq!(url, format!("https://cdn.example.com/{}", puts[0].key));

        // probe saw the staged file, the remuxed copy was what got uploaded
        assert_eq!(h.inspector.seen.lock().unwrap().len(), 1);
        assert_eq!(h.remuxer.outputs.lock().unwrap().len(), 1);
        assert!(staging_is_empty(&h));
    }

    #[tokio::test]
    async fn portrait_and_square_get_their_namespaces() {
        let h = ok_harness(1080, 1920);
        let url = h
            .pipeline
            .process(Uuid::new_v4(), Uuid::new_v4(), body(b"v"), "video/mp4", 1024)
            .await
            .unwrap();
        assert!(url.contains("/portrait/"));

        let h = ok_harness(1080, 1080);
        let url = h
            .pipeline
            .process(Uuid::new_v4(), Uuid::new_v4(), body(b"v"), "video/mp4", 1024)
            .await
            .unwrap();
        assert!(url.contains("/other/"));
    }

    #[tokio::test]
    async fn content_type_parameters_are_ignored() {
        let h = ok_harness(1920, 1080);
        h.pipeline
            .process(Uuid::new_v4(), Uuid::new_v4(), body(b"v"), "video/MP4; codecs=avc1", 1024)
            .await
            .unwrap();
        assert_eq!(h.uploader.puts.lock().unwrap()[0].content_type, "video/mp4");
    }

    #[tokio::test]
    async fn disallowed_type_stops_before_staging() {
        let h = ok_harness(1920, 1080);
        let err = h
            .pipeline
            .process(Uuid::new_v4(), Uuid::new_v4(), body(b"v"), "video/avi", 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedMediaType(_)));
        assert!(h.inspector.seen.lock().unwrap().is_empty());
        assert_eq!(h.uploader.put_count(), 0);
        assert!(staging_is_empty(&h));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_and_cleaned_up() {
        let h = ok_harness(1920, 1080);
        let err = h
            .pipeline
            .process(Uuid::new_v4(), Uuid::new_v4(), body(b"0123456789"), "video/mp4", 4)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TooLarge { limit: 4 }));
        assert!(h.inspector.seen.lock().unwrap().is_empty());
        assert_eq!(h.uploader.put_count(), 0);
        assert!(staging_is_empty(&h));
    }

    #[tokio::test]
    async fn probe_failure_is_not_guessed() {
        let h = harness(FixedInspector::failing(), CopyRemuxer::ok(), RecordingUploader::default());
        let err = h
            .pipeline
            .process(Uuid::new_v4(), Uuid::new_v4(), body(b"v"), "video/mp4", 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Probe(_)));
        assert!(h.remuxer.outputs.lock().unwrap().is_empty());
        assert_eq!(h.uploader.put_count(), 0);
        assert!(staging_is_empty(&h));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn remux_failure_uploads_nothing() {
        let h = harness(
            FixedInspector::geometry(1920, 1080),
            CopyRemuxer::failing(),
            RecordingUploader::default(),
        );
        let err = h
            .pipeline
            .process(Uuid::new_v4(), Uuid::new_v4(), body(b"v"), "video/mp4", 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Remux(_)));
        assert_eq!(h.uploader.put_count(), 0);
        assert!(staging_is_empty(&h));
    }

    #[tokio::test]
    async fn upload_failure_removes_both_temp_files() {
        let h = harness(
            FixedInspector::geometry(1920, 1080),
            CopyRemuxer::ok(),
            RecordingUploader::failing(),
        );
        let err = h
            .pipeline
            .process(Uuid::new_v4(), Uuid::new_v4(), body(b"v"), "video/mp4", 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Upload(_)));
        assert_eq!(h.uploader.put_count(), 1);
        assert_eq!(h.remuxer.outputs.lock().unwrap().len(), 1);
        assert!(staging_is_empty(&h));
    }

    #[test]
    fn public_url_joins_without_double_slash() {
        let h = ok_harness(1, 1);
        assert_eq!(
            h.pipeline.public_url("other/ab.mp4"),
            "https://cdn.example.com/other/ab.mp4"
        );
    }
}
