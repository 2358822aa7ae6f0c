//! Core data models for the video ingest service.
//!
//! `Video` maps to the `videos` table via `sqlx::FromRow` and serializes
//! as the record JSON returned by every upload endpoint.

pub mod media;
pub mod video;
