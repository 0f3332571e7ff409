//! Task and completion event messages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound transcoding task.
///
/// Produced by the upload service; the source object is expected at
/// `{bucket}/{video_id}` in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoTask {
    /// Video ID, doubles as the source object key
    pub video_id: Uuid,
    /// Owning user ID
    pub user_id: i64,
    /// Human-readable title, carried through untouched
    pub video_title: String,
}

/// Outbound completion event, published once per fully processed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompletedUpload {
    /// Video ID from the originating task
    pub video_id: Uuid,
    /// User ID from the originating task
    pub user_id: i64,
    /// Title from the originating task
    pub video_title: String,
    /// Object path of the published master playlist
    pub video_master_playlist_url: String,
}

impl CompletedUpload {
    /// Build the completion event for a task and its published master playlist.
    pub fn from_task(task: &VideoTask, master_playlist_url: impl Into<String>) -> Self {
        Self {
            video_id: task.video_id,
            user_id: task.user_id,
            video_title: task.video_title.clone(),
            video_master_playlist_url: master_playlist_url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> VideoTask {
        VideoTask {
            video_id: Uuid::parse_str("9f7f1c6e-2a4b-4f58-8a2d-3d5b8e7c1a90").unwrap(),
            user_id: 42,
            video_title: "launch keynote".to_string(),
        }
    }

    #[test]
    fn test_task_round_trip() {
        let task = sample_task();
        let json = serde_json::to_string(&task).unwrap();
        let back: VideoTask = serde_json::from_str(&json).unwrap();
        assert_eq!(task, back);
    }

    #[test]
    fn test_task_wire_field_names() {
        let json = serde_json::to_value(&sample_task()).unwrap();
        assert!(json.get("video_id").is_some());
        assert!(json.get("user_id").is_some());
        assert!(json.get("video_title").is_some());
    }

    #[test]
    fn test_completed_upload_round_trip() {
        let event = CompletedUpload::from_task(&sample_task(), "videos/p-1/master.m3u8");
        let json = serde_json::to_string(&event).unwrap();
        let back: CompletedUpload = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
        assert_eq!(back.video_master_playlist_url, "videos/p-1/master.m3u8");
    }

    #[test]
    fn test_completed_upload_carries_task_fields() {
        let task = sample_task();
        let event = CompletedUpload::from_task(&task, "videos/p-1/master.m3u8");
        assert_eq!(event.video_id, task.video_id);
        assert_eq!(event.user_id, task.user_id);
        assert_eq!(event.video_title, task.video_title);
    }

    #[test]
    fn test_malformed_task_rejected() {
        let malformed = r#"{"video_id": "not-a-uuid", "user_id": 1}"#;
        assert!(serde_json::from_str::<VideoTask>(malformed).is_err());
    }
}
