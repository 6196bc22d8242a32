use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PHOTO_PREVIEW: &str = "📷 Photo";
pub const FILE_PREVIEW: &str = "📄 File";
pub const GIF_PREVIEW: &str = "GIF";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    pub url: String,
}

/// A message document. Content is immutable once written; the only
/// permitted mutation is growing `delete_by`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub sender_id: String,
    pub text: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(flatten)]
    pub record: MessageRecord,
}

impl Message {
    /// Soft-deletion visibility: hidden from anyone in `delete_by`.
    pub fn visible_to(&self, uid: &str) -> bool {
        !self.record.delete_by.iter().any(|u| u == uid)
    }
}

/// Denormalized conversation preview, upserted on every send so the
/// conversation list never scans messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMeta {
    pub participants: Vec<String>,
    pub last_message: String,
    pub last_message_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A file picked for sending, not yet uploaded.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl OutgoingFile {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub text: String,
    pub files: Vec<OutgoingFile>,
}

/// Conversation-list preview for a freshly sent message.
pub fn preview(text: &str, image_count: usize, file_count: usize) -> String {
    if !text.is_empty() {
        text.to_string()
    } else if image_count > 0 {
        PHOTO_PREVIEW.to_string()
    } else if file_count > 0 {
        FILE_PREVIEW.to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_prefers_text_then_photo_then_file() {
        assert_eq!(preview("hello", 2, 2), "hello");
        assert_eq!(preview("", 1, 1), PHOTO_PREVIEW);
        assert_eq!(preview("", 0, 3), FILE_PREVIEW);
        assert_eq!(preview("", 0, 0), "");
    }

    #[test]
    fn visibility_follows_delete_by() {
        let message = Message {
            id: "m1".to_string(),
            record: MessageRecord {
                sender_id: "u1".to_string(),
                text: "hi".to_string(),
                image_urls: vec![],
                files: vec![],
                gif_url: None,
                timestamp: "2026-03-01T10:00:00Z".parse().unwrap(),
                delete_by: vec!["u1".to_string()],
            },
        };

        assert!(!message.visible_to("u1"));
        assert!(message.visible_to("u2"));
    }

    #[test]
    fn record_uses_store_field_names_and_tolerates_absent_optionals() {
        let parsed: MessageRecord = serde_json::from_value(serde_json::json!({
            "senderId": "u1",
            "text": "hi",
            "timestamp": "2026-03-01T10:00:00Z"
        }))
        .expect("parse sparse record");

        assert!(parsed.image_urls.is_empty());
        assert!(parsed.files.is_empty());
        assert!(parsed.gif_url.is_none());
        assert!(parsed.delete_by.is_empty());

        let json = serde_json::to_value(&parsed).expect("serialize");
        assert_eq!(json["senderId"], "u1");
        assert!(json.get("deleteBy").is_none());
    }
}
