// SPDX-License-Identifier: MIT

//! Wire protocol for the real-time channel.
//!
//! Inbound and outbound frames are JSON with a `type` tag. Malformed
//! inbound frames fail deserialization and are answered with an `error`
//! event; nothing else happens.

use crate::models::{ChatMessage, MessageType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A multicast address: a named grouping of live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// All live connections of one user (`user:{id}`).
    User(u64),
    /// Both parties of a conversation (`chat:{id}`).
    Chat(u64),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::User(id) => write!(f, "user:{}", id),
            RoomId::Chat(id) => write!(f, "chat:{}", id),
        }
    }
}

/// Messages a client may send over the socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinChatRoom {
        conversation_id: u64,
    },
    LeaveChatRoom {
        conversation_id: u64,
    },
    SendMessage {
        conversation_id: u64,
        content: String,
        #[serde(default)]
        message_type: MessageType,
    },
    TypingStart {
        conversation_id: u64,
    },
    TypingStop {
        conversation_id: u64,
    },
    GoalProgressBroadcast {
        payload: serde_json::Value,
    },
    ChallengeCompleted {
        payload: CelebrationPayload,
    },
    LevelUp {
        payload: LevelUpPayload,
    },
    PostLiked {
        post_id: u64,
        author_id: u64,
    },
    PostCommented {
        post_id: u64,
        author_id: u64,
        comment: String,
    },
}

/// XP/coin/streak deltas actually applied by a completion transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CelebrationPayload {
    pub challenge_id: String,
    pub xp_awarded: u32,
    pub coins_awarded: u32,
    pub streak_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_unlocked: Option<String>,
}

/// Totals after a level-up, as applied by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelUpPayload {
    pub xp: u32,
    pub level: u32,
    pub coins: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Comment,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        user_id: u64,
    },
    NewMessage {
        message: ChatMessage,
    },
    MessageNotification {
        conversation_id: u64,
        sender_id: u64,
        preview: String,
    },
    UserTyping {
        conversation_id: u64,
        user_id: u64,
    },
    UserStoppedTyping {
        conversation_id: u64,
        user_id: u64,
    },
    GoalProgress {
        user_id: u64,
        payload: serde_json::Value,
    },
    ChallengeCelebration {
        user_id: u64,
        #[serde(flatten)]
        payload: CelebrationPayload,
    },
    LevelUpCelebration {
        user_id: u64,
        #[serde(flatten)]
        payload: LevelUpPayload,
    },
    StreakMilestone {
        user_id: u64,
        streak_count: u32,
        badge_id: String,
    },
    DailyReminder {
        message: String,
    },
    PostInteraction {
        kind: InteractionKind,
        post_id: u64,
        actor_id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    Error {
        message: String,
    },
}
