use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// Prior-save lookup for one media element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    /// Normalized media URL; `None` for blob sources.
    pub media_url: Option<String>,
    #[serde(rename = "type")]
    pub media_type: String,
    pub author: String,
    pub tweet_id: Option<String>,
    /// Raw URL the backend derives the stored id from.
    pub original_url_for_id: String,
}

impl StatusQuery {
    #[must_use]
    pub fn new(
        kind: MediaKind,
        media_url: Option<String>,
        author: String,
        tweet_id: Option<String>,
        original_url_for_id: String,
    ) -> Self {
        Self {
            media_url,
            media_type: kind.as_str().to_string(),
            author,
            tweet_id,
            original_url_for_id,
        }
    }
}

/// The shape of a stored record, decoded from the backend's item fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "RawSavedItem")]
pub enum SavedRecord {
    Image,
    /// A full video file saved by older versions.
    FullVideo { is_gif: bool },
    /// Captured frames standing in for a video.
    FramePlaceholder { is_gif: bool },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSavedItem {
    #[serde(default)]
    is_gif: bool,
    #[serde(default)]
    saved_as_metadata: bool,
    #[serde(default, rename = "type")]
    item_type: Option<String>,
}

impl From<RawSavedItem> for SavedRecord {
    fn from(raw: RawSavedItem) -> Self {
        let is_video = raw.is_gif
            || matches!(raw.item_type.as_deref(), Some("video" | "gif"));
        match (is_video, raw.saved_as_metadata) {
            (_, true) => Self::FramePlaceholder { is_gif: raw.is_gif },
            (true, false) => Self::FullVideo { is_gif: raw.is_gif },
            (false, false) => Self::Image,
        }
    }
}

/// Answer to a [`StatusQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedStatus {
    pub is_saved: bool,
    #[serde(default, rename = "item")]
    pub record: Option<SavedRecord>,
}

/// Frame-capture metadata attached to a video placeholder save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFrameMeta {
    pub original_video_url: Option<String>,
    pub video_original_filename: String,
    pub unique_video_element_id: String,
}

/// A request to persist one image or one captured frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    /// Media URL or an inline `data:` payload.
    pub image_url: String,
    pub author: String,
    pub tweet_id: Option<String>,
    pub force_update: bool,
    pub width: u32,
    pub height: u32,
    pub is_placeholder_for_video: bool,
    #[serde(flatten)]
    pub video: Option<VideoFrameMeta>,
}

/// Result of a save request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveResponse {
    pub success: bool,
    pub item: Option<serde_json::Value>,
    /// An existing record had its position updated.
    pub updated: bool,
    /// The media was already stored.
    pub cached: bool,
    pub warning: Option<String>,
    pub error: Option<String>,
}

impl SaveResponse {
    /// User-facing summary of a successful save.
    #[must_use]
    pub fn summary(&self) -> &'static str {
        if self.updated {
            "Position updated"
        } else if self.cached {
            "Already saved"
        } else {
            "Saved"
        }
    }
}

/// Reply to a liveness check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PingResponse {
    pub success: bool,
}

/// A log record forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
}
