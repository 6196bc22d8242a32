use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the conversation between two users.
///
/// Both participants must derive the identical id so reads and writes
/// target the same documents, hence the lexicographic normalization.
/// Uids are globally unique and never contain `_` ambiguity worth
/// re-deriving, so no collision handling exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn between(uid_a: &str, uid_b: &str) -> Self {
        if uid_a <= uid_b {
            Self(format!("{}_{}", uid_a, uid_b))
        } else {
            Self(format!("{}_{}", uid_b, uid_a))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collection holding this channel's messages.
    pub fn messages_collection(&self) -> String {
        format!("chats/{}/messages", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
