use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

const DEFAULT_MAX_VIDEO_BYTES: u64 = 1 << 30;
const DEFAULT_MAX_THUMBNAIL_BYTES: u64 = 10 << 20;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;

/// Where uploaded thumbnails live.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailBackend {
    /// Files under the assets root, served from `/assets`.
    Local,
    /// Process memory, served from `/api/thumbnails/{videoID}`.
    Memory,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub assets_root: PathBuf,
    pub assets_base_url: String,
    pub public_base_url: String,
    pub staging_dir: PathBuf,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub distribution_base: String,
    pub jwt_secret: String,
    pub max_video_bytes: u64,
    pub max_thumbnail_bytes: u64,
    pub ffprobe_path: String,
    pub ffmpeg_path: String,
    pub tool_timeout: Duration,
    pub thumbnail_backend: ThumbnailBackend,
}

// The JWT secret stays out of startup logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("assets_root", &self.assets_root)
            .field("assets_base_url", &self.assets_base_url)
            .field("public_base_url", &self.public_base_url)
            .field("staging_dir", &self.staging_dir)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("distribution_base", &self.distribution_base)
            .field("jwt_secret", &"<redacted>")
            .field("max_video_bytes", &self.max_video_bytes)
            .field("max_thumbnail_bytes", &self.max_thumbnail_bytes)
            .field("ffprobe_path", &self.ffprobe_path)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("tool_timeout", &self.tool_timeout)
            .field("thumbnail_backend", &self.thumbnail_backend)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Video upload and fast-start publishing API")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_INGEST_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_INGEST_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides VIDEO_INGEST_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory where local thumbnails are written (overrides VIDEO_INGEST_ASSETS_ROOT)
    #[arg(long)]
    pub assets_root: Option<PathBuf>,

    /// Public URL prefix for files in the assets root (overrides VIDEO_INGEST_ASSETS_BASE_URL)
    #[arg(long)]
    pub assets_base_url: Option<String>,

    /// Public URL of this service (overrides VIDEO_INGEST_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Directory for staged uploads (overrides VIDEO_INGEST_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Destination bucket for processed videos (overrides VIDEO_INGEST_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// Bucket region (overrides VIDEO_INGEST_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Custom endpoint for S3-compatible stores (overrides VIDEO_INGEST_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Base URL that fronts the bucket, e.g. a CDN distribution
    /// (overrides VIDEO_INGEST_DISTRIBUTION_BASE)
    #[arg(long)]
    pub distribution_base: Option<String>,

    /// HS256 secret for bearer tokens (overrides VIDEO_INGEST_JWT_SECRET)
    #[arg(long)]
    pub jwt_secret: Option<String>,

    /// Largest accepted video payload in bytes (overrides VIDEO_INGEST_MAX_VIDEO_BYTES)
    #[arg(long)]
    pub max_video_bytes: Option<u64>,

    /// Largest accepted thumbnail payload in bytes (overrides VIDEO_INGEST_MAX_THUMBNAIL_BYTES)
    #[arg(long)]
    pub max_thumbnail_bytes: Option<u64>,

    /// ffprobe binary (overrides VIDEO_INGEST_FFPROBE)
    #[arg(long)]
    pub ffprobe_path: Option<String>,

    /// ffmpeg binary (overrides VIDEO_INGEST_FFMPEG)
    #[arg(long)]
    pub ffmpeg_path: Option<String>,

    /// Seconds an ffprobe/ffmpeg run may take (overrides VIDEO_INGEST_TOOL_TIMEOUT_SECS)
    #[arg(long)]
    pub tool_timeout_secs: Option<u64>,

    /// Thumbnail storage strategy (overrides VIDEO_INGEST_THUMBNAIL_BACKEND)
    #[arg(long, value_enum)]
    pub thumbnail_backend: Option<ThumbnailBackend>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge already-parsed CLI args over the environment and defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        let host = args
            .host
            .unwrap_or_else(|| env_string("VIDEO_INGEST_HOST", "0.0.0.0"));
        let port = match args.port {
            Some(port) => port,
            None => env_parsed("VIDEO_INGEST_PORT", 8091)?,
        };

        let s3_bucket = args
            .s3_bucket
            .unwrap_or_else(|| env_string("VIDEO_INGEST_S3_BUCKET", "videos"));
        let s3_region = args
            .s3_region
            .unwrap_or_else(|| env_string("VIDEO_INGEST_S3_REGION", "us-east-1"));
        let s3_endpoint = args
            .s3_endpoint
            .or_else(|| env::var("VIDEO_INGEST_S3_ENDPOINT").ok())
            .filter(|v| !v.is_empty());
        let distribution_base = args
            .distribution_base
            .or_else(|| env::var("VIDEO_INGEST_DISTRIBUTION_BASE").ok())
            .unwrap_or_else(|| match &s3_endpoint {
                Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), s3_bucket),
                None => format!("https://{}.s3.{}.amazonaws.com", s3_bucket, s3_region),
            });

        let public_base_url = args
            .public_base_url
            .or_else(|| env::var("VIDEO_INGEST_PUBLIC_BASE_URL").ok())
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        let assets_base_url = args
            .assets_base_url
            .or_else(|| env::var("VIDEO_INGEST_ASSETS_BASE_URL").ok())
            .unwrap_or_else(|| format!("{}/assets", public_base_url.trim_end_matches('/')));

        let jwt_secret = match args
            .jwt_secret
            .or_else(|| env::var("VIDEO_INGEST_JWT_SECRET").ok())
        {
            Some(secret) if !secret.is_empty() => secret,
            _ => bail!("a JWT secret is required (--jwt-secret or VIDEO_INGEST_JWT_SECRET)"),
        };

        let max_video_bytes = match args.max_video_bytes {
            Some(v) => v,
            None => env_parsed("VIDEO_INGEST_MAX_VIDEO_BYTES", DEFAULT_MAX_VIDEO_BYTES)?,
        };
        let max_thumbnail_bytes = match args.max_thumbnail_bytes {
            Some(v) => v,
            None => env_parsed("VIDEO_INGEST_MAX_THUMBNAIL_BYTES", DEFAULT_MAX_THUMBNAIL_BYTES)?,
        };
        let tool_timeout_secs = match args.tool_timeout_secs {
            Some(v) => v,
            None => env_parsed("VIDEO_INGEST_TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT_SECS)?,
        };

        let thumbnail_backend = match args.thumbnail_backend {
            Some(backend) => backend,
            None => match env::var("VIDEO_INGEST_THUMBNAIL_BACKEND") {
                Ok(value) => <ThumbnailBackend as ValueEnum>::from_str(&value, true).map_err(|err| {
                    anyhow::anyhow!("parsing VIDEO_INGEST_THUMBNAIL_BACKEND: {}", err)
                })?,
                Err(_) => ThumbnailBackend::Local,
            },
        };

        Ok(Self {
            host,
            port,
            database_url: args.database_url.unwrap_or_else(|| {
                env_string(
                    "VIDEO_INGEST_DATABASE_URL",
                    "sqlite://./data/meta/videos.db",
                )
            }),
            assets_root: args
                .assets_root
                .unwrap_or_else(|| env_string("VIDEO_INGEST_ASSETS_ROOT", "./assets").into()),
            assets_base_url,
            public_base_url,
            staging_dir: args
                .staging_dir
                .or_else(|| env::var("VIDEO_INGEST_STAGING_DIR").ok().map(PathBuf::from))
                .unwrap_or_else(env::temp_dir),
            s3_bucket,
            s3_region,
            s3_endpoint,
            distribution_base,
            jwt_secret,
            max_video_bytes,
            max_thumbnail_bytes,
            ffprobe_path: args
                .ffprobe_path
                .unwrap_or_else(|| env_string("VIDEO_INGEST_FFPROBE", "ffprobe")),
            ffmpeg_path: args
                .ffmpeg_path
                .unwrap_or_else(|| env_string("VIDEO_INGEST_FFMPEG", "ffmpeg")),
            tool_timeout: Duration::from_secs(tool_timeout_secs),
            thumbnail_backend,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
