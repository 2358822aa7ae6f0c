//! Represents a content record: one uploaded (or pending) video.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Parameters supplied when a record is created.
///
/// The owner (`user_id`) is fixed at creation and never rewritten.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct CreateVideoParams {
    pub title: String,
    pub description: String,
    pub user_id: Uuid,
}

/// A video record and its current asset URLs.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Video {
    /// Record identity.
    pub id: Uuid,

    pub created_at: DateTime<Utc>,

    /// Bumped on every accepted thumbnail or video upload.
    pub updated_at: DateTime<Utc>,

    /// Public URL of the current thumbnail, if any.
    pub thumbnail_url: Option<String>,

    /// Public URL of the processed video, if any.
    pub video_url: Option<String>,

    #[serde(flatten)]
    #[sqlx(flatten)]
    pub params: CreateVideoParams,
}

impl Video {
    pub fn owner(&self) -> Uuid {
        self.params.user_id
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.params.user_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Video {
        let now = Utc::now();
        Video {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            thumbnail_url: None,
            video_url: None,
            params: CreateVideoParams {
                title: "boots".into(),
                description: "a pair of boots".into(),
                user_id: Uuid::new_v4(),
            },
        }
    }

    #[test]
    fn json_flattens_creation_params() {
        let video = sample();
        let json = serde_json::to_value(&video).unwrap();
        assert_eq!(json["title"], "boots");
        assert_eq!(json["user_id"], video.owner().to_string());
        assert!(json["video_url"].is_null());
        assert!(json.get("params").is_none());
    }

    #[test]
    fn ownership_follows_user_id() {
        let video = sample();
        assert!(video.is_owned_by(video.params.user_id));
        assert!(!video.is_owned_by(Uuid::new_v4()));
    }
}
