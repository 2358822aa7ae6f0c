//! Fast-start container rewrite via `ffmpeg`.

use crate::services::process::{ToolError, run_with_timeout};
use async_trait::async_trait;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Suffix appended to the source path for the rewritten file.
pub const REMUX_SUFFIX: &str = ".processing";

#[derive(Debug, Error)]
pub enum RemuxError {
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Rewrites a media container so playback metadata precedes the media data.
#[async_trait]
pub trait ContainerRemuxer: Send + Sync {
    /// Write a fast-start copy next to `path` and return its location.
    /// The source file is never modified; the caller owns both files.
    async fn remux(&self, path: &Path) -> Result<PathBuf, RemuxError>;
}

pub struct FfmpegRemuxer {
    ffmpeg_path: String,
    timeout: Duration,
}

impl FfmpegRemuxer {
    pub fn new(ffmpeg_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ContainerRemuxer for FfmpegRemuxer {
    #[tracing::instrument(skip(self), fields(tool = %self.ffmpeg_path))]
    async fn remux(&self, path: &Path) -> Result<PathBuf, RemuxError> {
        let output_path = remux_output_path(path);

        // Stream copy only: codec data is untouched, just the moov atom moves.
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-y", "-v", "error", "-i"])
            .arg(path)
            .args(["-c", "copy", "-movflags", "faststart", "-f", "mp4"])
            .arg(&output_path);

        if let Err(err) = run_with_timeout(command, self.timeout).await {
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(err.into());
        }

        debug!(output = %output_path.display(), "remuxed for fast start");
        Ok(output_path)
    }
}

/// `{path}.processing`, a sibling of the source file.
pub fn remux_output_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(REMUX_SUFFIX);
    PathBuf::from(raw)
}
