use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }
}

/// A friend-request record as stored in the `friendRequests`
/// collection. Field names follow the hosted store's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestRecord {
    pub sender_uid: String,
    pub sender_display_name: String,
    pub receiver_uid: String,
    pub receiver_display_name: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// A request joined with its document id, as surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: String,
    #[serde(flatten)]
    pub record: FriendRequestRecord,
}

impl FriendRequest {
    /// The party that is not `uid`.
    pub fn other_party(&self, uid: &str) -> &str {
        if self.record.sender_uid == uid {
            &self.record.receiver_uid
        } else {
            &self.record.sender_uid
        }
    }
}

/// Resolved profile of a counterparty, ready for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendProfile {
    pub uid: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub background_color: String,
}

/// One row of the derived accepted-friends list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendEntry {
    /// Id of the accepted request backing this friendship; removing
    /// the friendship deletes this document.
    pub request_id: String,
    pub uid: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub background_color: String,
}

/// A pending request annotated with the counterparty's profile, for
/// the received/sent request lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequest {
    pub request: FriendRequest,
    pub counterparty: FriendProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_store_field_names() {
        let record = FriendRequestRecord {
            sender_uid: "u1".to_string(),
            sender_display_name: "alice".to_string(),
            receiver_uid: "u2".to_string(),
            receiver_display_name: "bob".to_string(),
            status: RequestStatus::Pending,
            created_at: "2026-03-01T10:00:00Z".parse().unwrap(),
        };

        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["senderUid"], "u1");
        assert_eq!(json["receiverDisplayName"], "bob");
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn other_party_is_symmetric() {
        let request = FriendRequest {
            id: "r1".to_string(),
            record: FriendRequestRecord {
                sender_uid: "u1".to_string(),
                sender_display_name: "alice".to_string(),
                receiver_uid: "u2".to_string(),
                receiver_display_name: "bob".to_string(),
                status: RequestStatus::Accepted,
                created_at: "2026-03-01T10:00:00Z".parse().unwrap(),
            },
        };

        assert_eq!(request.other_party("u1"), "u2");
        assert_eq!(request.other_party("u2"), "u1");
    }
}
