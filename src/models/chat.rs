//! Chat conversation and message models.

use serde::{Deserialize, Serialize};

/// A two-party conversation. Participation checks for chat actions are
/// resolved against this record, not against room membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID (also used as document ID)
    pub conversation_id: u64,
    pub user_a: u64,
    pub user_b: u64,
    pub created_at: String,
}

impl Conversation {
    pub fn includes(&self, user_id: u64) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The counterpart of `user_id`, if they participate at all.
    pub fn other_party(&self, user_id: u64) -> Option<u64> {
        if self.user_a == user_id {
            Some(self.user_b)
        } else if self.user_b == user_id {
            Some(self.user_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    System,
}

/// A persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Document ID: `{conversation_id}_{unix_nanos}`
    pub message_id: String,
    pub conversation_id: u64,
    pub sender_id: u64,
    pub receiver_id: u64,
    pub content: String,
    pub message_type: MessageType,
    /// RFC3339
    pub sent_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_party() {
        let convo = Conversation {
            conversation_id: 5,
            user_a: 10,
            user_b: 20,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        };
        assert_eq!(convo.other_party(10), Some(20));
        assert_eq!(convo.other_party(20), Some(10));
        assert_eq!(convo.other_party(30), None);
        assert!(convo.includes(10));
        assert!(!convo.includes(30));
    }
}
