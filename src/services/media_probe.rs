//! Stream geometry via `ffprobe`.

use crate::services::process::{ToolError, run_with_timeout};
use async_trait::async_trait;
use serde::Deserialize;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("unparsable probe output: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("no streams in file")]
    NoStreams,
    #[error("first stream has no usable geometry ({width:?}x{height:?})")]
    MissingGeometry {
        width: Option<u32>,
        height: Option<u32>,
    },
}

/// Reads the display geometry of a local media file.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    /// Width and height of the file's first stream. Height is never zero.
    async fn probe(&self, path: &Path) -> Result<(u32, u32), ProbeError>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
}

pub struct FfprobeInspector {
    ffprobe_path: String,
    timeout: Duration,
}

impl FfprobeInspector {
    pub fn new(ffprobe_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MediaInspector for FfprobeInspector {
    #[tracing::instrument(skip(self), fields(tool = %self.ffprobe_path))]
    async fn probe(&self, path: &Path) -> Result<(u32, u32), ProbeError> {
        let mut command = Command::new(&self.ffprobe_path);
        command
            .args(["-v", "error", "-print_format", "json", "-show_streams"])
            .arg(path);

        let output = run_with_timeout(command, self.timeout).await?;
        let geometry = parse_geometry(&output.stdout)?;
        debug!(width = geometry.0, height = geometry.1, "probed stream geometry");
        Ok(geometry)
    }
}

/// Pull the first stream's width/height out of `ffprobe -show_streams` JSON.
fn parse_geometry(stdout: &[u8]) -> Result<(u32, u32), ProbeError> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)?;
    let first = parsed.streams.first().ok_or(ProbeError::NoStreams)?;
    match (first.width, first.height) {
        (Some(width), Some(height)) if height > 0 => Ok((width, height)),
        (width, height) => Err(ProbeError::MissingGeometry { width, height }),
    }
}
