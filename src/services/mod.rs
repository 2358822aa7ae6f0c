pub mod auth;
pub mod keygen;
pub mod media_probe;
pub mod object_uploader;
pub mod process;
pub mod remuxer;
pub mod staging;
pub mod thumbnail_ingestor;
pub mod thumbnail_store;
pub mod upload_pipeline;
pub mod video_store;
