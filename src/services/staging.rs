//! Scoped local files for in-flight uploads.
//!
//! Both guards delete their file when dropped, so every exit path of a
//! request (success, error, early return, panic, cancellation) cleans up.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};
use tempfile::TempPath;
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncSeekExt, AsyncWriteExt},
};
use tracing::debug;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("reading upload body: {0}")]
    Body(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A process-private temp file receiving one upload.
pub struct StagedUpload {
    file: File,
    path: TempPath,
    size: u64,
}

impl StagedUpload {
    /// Create an empty staging file in `dir`, named `upload-*.{extension}`.
    pub async fn create_in(dir: &Path, extension: &str) -> Result<Self, StagingError> {
        let dir = dir.to_path_buf();
        let suffix = format!(".{}", extension);
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("upload-")
                .suffix(&suffix)
                .tempfile_in(dir)
        })
        .await
        .map_err(io::Error::other)??;

        let (file, path) = named.into_parts();
        Ok(Self {
            file: File::from_std(file),
            path,
            size: 0,
        })
    }

    /// Copy `stream` into the file, failing as soon as more than `limit`
    /// bytes have arrived. Returns the number of bytes written.
    pub async fn write_stream<S>(&mut self, stream: S, limit: u64) -> Result<u64, StagingError>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(StagingError::Body)?;
            let next = self.size + chunk.len() as u64;
            if next > limit {
                return Err(StagingError::TooLarge { limit });
            }
            self.file.write_all(&chunk).await?;
            self.size = next;
        }
        self.file.flush().await?;
        debug!(bytes = self.size, path = %self.path.display(), "staged upload");
        Ok(self.size)
    }

    /// Seek back to the start so the file can be re-read from the top.
    pub async fn rewind(&mut self) -> Result<(), StagingError> {
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Takes ownership of a file some other step produced and removes it on drop.
pub struct ScratchFile {
    path: TempPath,
}

impl ScratchFile {
    pub fn adopt(path: PathBuf) -> Self {
        Self {
            path: TempPath::from_path(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn writes_rewinds_and_removes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedUpload::create_in(dir.path(), "mp4").await.unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));

        let written = staged
            .write_stream(chunks(&[b"abc", b"def"]), 1024)
            .await
            .unwrap();
        assert_eq!(written, 6);
        assert_eq!(staged.size(), 6);
        staged.rewind().await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcdef");

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn limit_is_enforced_mid_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedUpload::create_in(dir.path(), "mp4").await.unwrap();
        let path = staged.path().to_path_buf();

        let err = staged
            .write_stream(chunks(&[b"1234", b"5678"]), 6)
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::TooLarge { limit: 6 }));
        assert_eq!(staged.size(), 4);

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn exact_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedUpload::create_in(dir.path(), "mp4").await.unwrap();
        assert_eq!(staged.write_stream(chunks(&[b"123456"]), 6).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn body_errors_are_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedUpload::create_in(dir.path(), "mp4").await.unwrap();
        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")),
        ]);
        assert!(matches!(
            staged.write_stream(broken, 1024).await,
            Err(StagingError::Body(_))
        ));
    }

    #[tokio::test]
    async fn scratch_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leftover.processing");
        tokio::fs::write(&path, b"x").await.unwrap();

        let scratch = ScratchFile::adopt(path.clone());
        assert_eq!(scratch.path(), path.as_path());
        drop(scratch);
        assert!(!path.exists());
    }
}
