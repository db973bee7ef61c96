// SPDX-License-Identifier: MIT

//! Event dispatcher: routes domain events to the correct rooms.
//!
//! Handlers verify chat participation against the persisted
//! conversation before any side effect, then mutate (persist) and only
//! afterwards fan out, so a persistence failure never produces a
//! partial broadcast.
//!
//! The daily reminder sweep is owned here as an explicit scheduled
//! task, parameterized by the clock so tests can drive it directly.

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::{ChatMessage, MessageType};
use crate::realtime::events::{
    CelebrationPayload, ClientMessage, InteractionKind, LevelUpPayload, RoomId, ServerEvent,
};
use crate::realtime::hub::{ConnectionHub, ConnectionId};
use crate::time_utils::{day_key, format_utc_rfc3339, next_occurrence_of_hour, Clock};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Longest message prefix echoed in a preview notification.
const PREVIEW_MAX_CHARS: usize = 80;

pub struct EventDispatcher {
    hub: Arc<ConnectionHub>,
    db: FirestoreDb,
    clock: Arc<dyn Clock>,
    /// Per-conversation send locks: delivery order within a chat room
    /// must follow persistence commit order, so racing senders
    /// serialize the persist-then-dispatch pair per conversation.
    chat_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl EventDispatcher {
    pub fn new(hub: Arc<ConnectionHub>, db: FirestoreDb, clock: Arc<dyn Clock>) -> Self {
        Self {
            hub,
            db,
            clock,
            chat_locks: DashMap::new(),
        }
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    // ─── Inbound Socket Messages ─────────────────────────────────

    /// Handle one inbound message from `conn_id` (bound to `user_id`
    /// at handshake). Errors are reported back to this caller only.
    pub async fn handle_client_message(
        &self,
        conn_id: ConnectionId,
        user_id: u64,
        msg: ClientMessage,
    ) -> Result<()> {
        match msg {
            ClientMessage::JoinChatRoom { conversation_id } => {
                // Membership alone grants nothing; side-effecting chat
                // actions re-check participation below.
                self.hub.join(conn_id, RoomId::Chat(conversation_id));
                Ok(())
            }
            ClientMessage::LeaveChatRoom { conversation_id } => {
                self.hub.leave(conn_id, RoomId::Chat(conversation_id));
                Ok(())
            }
            ClientMessage::SendMessage {
                conversation_id,
                content,
                message_type,
            } => {
                self.send_chat_message(user_id, conversation_id, content, message_type)
                    .await
            }
            ClientMessage::TypingStart { conversation_id } => {
                self.relay_typing(conn_id, user_id, conversation_id, true)
                    .await
            }
            ClientMessage::TypingStop { conversation_id } => {
                self.relay_typing(conn_id, user_id, conversation_id, false)
                    .await
            }
            ClientMessage::GoalProgressBroadcast { payload } => {
                self.hub.send_to_room(
                    RoomId::User(user_id),
                    &ServerEvent::GoalProgress { user_id, payload },
                );
                Ok(())
            }
            ClientMessage::ChallengeCompleted { payload } => {
                self.celebrate_completion(user_id, payload);
                Ok(())
            }
            ClientMessage::LevelUp { payload } => {
                self.celebrate_level_up(user_id, payload);
                Ok(())
            }
            ClientMessage::PostLiked { post_id, author_id } => {
                self.post_interaction(user_id, author_id, InteractionKind::Like, post_id, None);
                Ok(())
            }
            ClientMessage::PostCommented {
                post_id,
                author_id,
                comment,
            } => {
                self.post_interaction(
                    user_id,
                    author_id,
                    InteractionKind::Comment,
                    post_id,
                    Some(comment),
                );
                Ok(())
            }
        }
    }

    /// Persist a chat message, then deliver it to the chat room and a
    /// preview to the receiver's user room (never a self-preview).
    async fn send_chat_message(
        &self,
        sender_id: u64,
        conversation_id: u64,
        content: String,
        message_type: MessageType,
    ) -> Result<()> {
        if content.is_empty() {
            return Err(AppError::Validation("Empty message content".to_string()));
        }

        let conversation = self
            .db
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Conversation {} not found", conversation_id))
            })?;

        let receiver_id = conversation.other_party(sender_id).ok_or_else(|| {
            AppError::Forbidden(format!(
                "Not a participant of conversation {}",
                conversation_id
            ))
        })?;

        // Serialize persist+dispatch per conversation so in-room
        // delivery order matches commit order.
        let lock = self
            .chat_locks
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let now = self.clock.now_utc();
        let message = ChatMessage {
            message_id: format!(
                "{}_{}",
                conversation_id,
                now.timestamp_nanos_opt().unwrap_or_default()
            ),
            conversation_id,
            sender_id,
            receiver_id,
            content,
            message_type,
            sent_at: format_utc_rfc3339(now),
        };

        self.db.append_chat_message(&message).await?;

        let preview: String = message.content.chars().take(PREVIEW_MAX_CHARS).collect();
        self.hub.send_to_room(
            RoomId::Chat(conversation_id),
            &ServerEvent::NewMessage { message },
        );
        if receiver_id != sender_id {
            self.hub.send_to_room(
                RoomId::User(receiver_id),
                &ServerEvent::MessageNotification {
                    conversation_id,
                    sender_id,
                    preview,
                },
            );
        }
        Ok(())
    }

    /// Ephemeral typing indicator to the chat room, excluding the
    /// sender. Nothing is persisted.
    async fn relay_typing(
        &self,
        conn_id: ConnectionId,
        user_id: u64,
        conversation_id: u64,
        started: bool,
    ) -> Result<()> {
        let conversation = self
            .db
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Conversation {} not found", conversation_id))
            })?;
        if !conversation.includes(user_id) {
            return Err(AppError::Forbidden(format!(
                "Not a participant of conversation {}",
                conversation_id
            )));
        }

        let event = if started {
            ServerEvent::UserTyping {
                conversation_id,
                user_id,
            }
        } else {
            ServerEvent::UserStoppedTyping {
                conversation_id,
                user_id,
            }
        };
        self.hub
            .send_to_room_except(RoomId::Chat(conversation_id), conn_id, &event);
        Ok(())
    }

    // ─── Domain Event Fan-out ────────────────────────────────────

    /// A like/comment notifies the post author; never the actor about
    /// their own post.
    pub fn post_interaction(
        &self,
        actor_id: u64,
        author_id: u64,
        kind: InteractionKind,
        post_id: u64,
        comment: Option<String>,
    ) {
        if actor_id == author_id {
            return;
        }
        self.hub.send_to_room(
            RoomId::User(author_id),
            &ServerEvent::PostInteraction {
                kind,
                post_id,
                actor_id,
                comment,
            },
        );
    }

    /// Celebration carrying the deltas the completion actually applied.
    pub fn celebrate_completion(&self, user_id: u64, payload: CelebrationPayload) {
        self.hub.send_to_room(
            RoomId::User(user_id),
            &ServerEvent::ChallengeCelebration { user_id, payload },
        );
    }

    pub fn celebrate_level_up(&self, user_id: u64, payload: LevelUpPayload) {
        self.hub.send_to_room(
            RoomId::User(user_id),
            &ServerEvent::LevelUpCelebration { user_id, payload },
        );
    }

    pub fn celebrate_streak_milestone(&self, user_id: u64, streak_count: u32, badge_id: String) {
        self.hub.send_to_room(
            RoomId::User(user_id),
            &ServerEvent::StreakMilestone {
                user_id,
                streak_count,
                badge_id,
            },
        );
    }

    // ─── Daily Reminder Sweep ────────────────────────────────────

    /// Run the reminder loop: once per day at `hour_utc`, remind every
    /// user active within the last `active_days` days.
    pub fn spawn_reminder_sweep(
        self: Arc<Self>,
        hour_utc: u32,
        active_days: u32,
    ) -> tokio::task::JoinHandle<()> {
        let dispatcher = self;
        tokio::spawn(async move {
            loop {
                let now = dispatcher.clock.now_utc();
                let next = next_occurrence_of_hour(now, hour_utc);
                let wait = (next - now).to_std().unwrap_or_default();
                tracing::debug!(seconds = wait.as_secs(), "Reminder sweep sleeping");
                tokio::time::sleep(wait).await;

                if let Err(e) = dispatcher.run_reminder_sweep(active_days).await {
                    tracing::warn!(error = %e, "Reminder sweep failed");
                }
            }
        })
    }

    /// One enumeration pass. Returns how many users were swept.
    pub async fn run_reminder_sweep(&self, active_days: u32) -> Result<usize> {
        let today = self.clock.now_utc().date_naive();
        let min_day = day_key(today - chrono::Duration::days(i64::from(active_days)));

        let users = self.db.recently_active_users(&min_day).await?;
        for user in &users {
            self.hub.send_to_room(
                RoomId::User(user.user_id),
                &ServerEvent::DailyReminder {
                    message: format!(
                        "Keep your {}-day streak going - today's challenges are waiting!",
                        user.streak_count
                    ),
                },
            );
        }

        tracing::info!(users = users.len(), "Daily reminder sweep complete");
        Ok(users.len())
    }
}
