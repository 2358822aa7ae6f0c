use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, ThumbnailBackend};
use services::{
    auth::JwtAuthenticator,
    media_probe::FfprobeInspector,
    object_uploader::S3Uploader,
    remuxer::FfmpegRemuxer,
    thumbnail_ingestor::ThumbnailIngestor,
    thumbnail_store::{LocalThumbnailStore, MemoryThumbnailStore, ThumbnailStore},
    upload_pipeline::UploadPipeline,
    video_store::{SqliteVideoStore, VideoStore, apply_schema},
};
use state::{AppState, UploadLimits};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting video-ingest with config: {:?}", cfg);

    // --- Ensure working directories exist ---
    for dir in [&cfg.assets_root, &cfg.staging_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
            tracing::info!("Created directory {}", dir.display());
        }
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let connect_options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database URL {}", db_url))?
        .create_if_missing(true);
    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?,
    );

    // --- Handle migration mode ---
    if migrate {
        apply_schema(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }
    apply_schema(&db)
        .await
        .context("applying database schema")?;

    // --- Media tooling and object storage ---
    let uploader = S3Uploader::new(cfg.s3_region.clone(), cfg.s3_endpoint.clone()).await;
    let pipeline = UploadPipeline::new(
        Arc::new(FfprobeInspector::new(cfg.ffprobe_path.clone(), cfg.tool_timeout)),
        Arc::new(FfmpegRemuxer::new(cfg.ffmpeg_path.clone(), cfg.tool_timeout)),
        Arc::new(uploader),
        cfg.staging_dir.clone(),
        cfg.s3_bucket.clone(),
        cfg.distribution_base.clone(),
    );

    // --- Thumbnails ---
    let thumbnail_store: Arc<dyn ThumbnailStore> = match cfg.thumbnail_backend {
        ThumbnailBackend::Local => Arc::new(LocalThumbnailStore::new(
            cfg.assets_root.clone(),
            cfg.assets_base_url.clone(),
        )),
        ThumbnailBackend::Memory => {
            tracing::warn!("Thumbnails are held in memory and will not survive a restart");
            Arc::new(MemoryThumbnailStore::new(cfg.public_base_url.clone()))
        }
    };

    let limits = UploadLimits {
        max_video_bytes: cfg.max_video_bytes,
        max_thumbnail_bytes: cfg.max_thumbnail_bytes,
    };
    let videos: Arc<dyn VideoStore> = Arc::new(SqliteVideoStore::new(db.clone()));
    let state = AppState {
        db: db.clone(),
        videos: videos.clone(),
        auth: Arc::new(JwtAuthenticator::new(&cfg.jwt_secret)),
        pipeline: Arc::new(pipeline),
        thumbnails: ThumbnailIngestor::new(thumbnail_store, videos),
        assets_root: cfg.assets_root.clone(),
        limits,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(limits).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
