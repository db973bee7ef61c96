// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (XP/level/coins/streak/badges)
//! - Challenge definitions
//! - Challenge attempts (one row per user/challenge/day)
//! - Conversations and chat messages
//!
//! Every reward-bearing mutation runs inside a Firestore transaction:
//! the row is re-read at the start of each attempt, the guard condition
//! is re-checked, and a failed commit retries with fresh data. The
//! attempt `status` field is the guard for the completion transition,
//! so a caller that loses the race observes the row already terminal
//! and applies nothing.

use crate::db::collections;
use crate::error::AppError;
use crate::models::user::{streak_badge_id, RewardOutcome, StreakAction, STREAK_MILESTONES};
use crate::models::{
    AttemptStatus, ChallengeAttempt, ChallengeDefinition, ChatMessage, Conversation, ProgressMap,
    User,
};

/// Transaction attempts before giving up on a contended row.
const TXN_MAX_ATTEMPTS: u32 = 3;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // ExternalJwtFunctionSource provides a dummy token without needing a
        // custom TokenSource implementation struct.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by ID.
    pub async fn get_user(&self, user_id: u64) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user.user_id.to_string())
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Users whose last streak-qualifying activity is on or after `min_day`.
    ///
    /// Used by the daily reminder sweep.
    pub async fn recently_active_users(&self, min_day: &str) -> Result<Vec<User>, AppError> {
        let min_day = min_day.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| {
                q.for_all([q
                    .field("last_activity_date")
                    .greater_than_or_equal(min_day.clone())])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Atomic User Mutations ───────────────────────────────────

    /// Atomically apply an XP/coin delta to a user.
    ///
    /// Read-modify-write runs per transaction attempt on freshly-read
    /// data, so concurrent rewards from unrelated sources (a like
    /// landing at the same moment as a challenge completion) remain
    /// additive rather than one overwriting the other.
    pub async fn apply_reward_atomic(
        &self,
        user_id: u64,
        xp_delta: u32,
        coin_delta: u32,
    ) -> Result<RewardOutcome, AppError> {
        for attempt in 1..=TXN_MAX_ATTEMPTS {
            let mut transaction = self
                .get_client()?
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let mut user = self
                .get_user(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

            let outcome = user.grant(xp_delta, coin_delta);

            self.get_client()?
                .fluent()
                .update()
                .in_col(collections::USERS)
                .document_id(user_id.to_string())
                .object(&user)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add user to transaction: {}", e))
                })?;

            match transaction.commit().await {
                Ok(_) => {
                    tracing::debug!(user_id, xp_delta, coin_delta, "Reward applied");
                    return Ok(outcome);
                }
                Err(e) if attempt < TXN_MAX_ATTEMPTS => {
                    tracing::debug!(user_id, attempt, error = %e, "Reward commit contended, retrying");
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Reward transaction failed: {}",
                        e
                    )))
                }
            }
        }
        unreachable!("reward transaction loop always returns")
    }

    /// Atomically award a badge. Returns `false` if already owned.
    pub async fn award_badge_atomic(
        &self,
        user_id: u64,
        badge_id: &str,
        now: &str,
    ) -> Result<bool, AppError> {
        for attempt in 1..=TXN_MAX_ATTEMPTS {
            let mut transaction = self
                .get_client()?
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let mut user = self
                .get_user(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

            if !user.add_badge(badge_id, now) {
                let _ = transaction.rollback().await;
                return Ok(false);
            }

            self.get_client()?
                .fluent()
                .update()
                .in_col(collections::USERS)
                .document_id(user_id.to_string())
                .object(&user)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add user to transaction: {}", e))
                })?;

            match transaction.commit().await {
                Ok(_) => {
                    tracing::info!(user_id, badge_id, "Badge awarded");
                    return Ok(true);
                }
                Err(e) if attempt < TXN_MAX_ATTEMPTS => {
                    tracing::debug!(user_id, attempt, error = %e, "Badge commit contended, retrying");
                }
                Err(e) => {
                    return Err(AppError::Database(format!("Badge transaction failed: {}", e)))
                }
            }
        }
        unreachable!("badge transaction loop always returns")
    }

    /// Atomically advance or reset the user-level streak.
    ///
    /// Returns the new streak count and the milestone badge awarded by
    /// this call, if the new count landed exactly on a milestone.
    pub async fn advance_streak_atomic(
        &self,
        user_id: u64,
        action: StreakAction,
        today: &str,
        now: &str,
    ) -> Result<(u32, Option<String>), AppError> {
        let new_count = 'outer: {
            for attempt in 1..=TXN_MAX_ATTEMPTS {
                let mut transaction =
                    self.get_client()?.begin_transaction().await.map_err(|e| {
                        AppError::Database(format!("Failed to begin transaction: {}", e))
                    })?;

                let mut user = self
                    .get_user(user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

                let count = user.advance_streak(action, today);

                self.get_client()?
                    .fluent()
                    .update()
                    .in_col(collections::USERS)
                    .document_id(user_id.to_string())
                    .object(&user)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!("Failed to add user to transaction: {}", e))
                    })?;

                match transaction.commit().await {
                    Ok(_) => break 'outer count,
                    Err(e) if attempt < TXN_MAX_ATTEMPTS => {
                        tracing::debug!(user_id, attempt, error = %e, "Streak commit contended, retrying");
                    }
                    Err(e) => {
                        return Err(AppError::Database(format!(
                            "Streak transaction failed: {}",
                            e
                        )))
                    }
                }
            }
            unreachable!("streak transaction loop always returns")
        };

        // Milestone badge check happens after the committed increment.
        // award_badge_atomic is idempotent, so a repeated call at the
        // same count is harmless.
        let mut milestone = None;
        if action == StreakAction::Increment && STREAK_MILESTONES.contains(&new_count) {
            let badge_id = streak_badge_id(new_count);
            if self.award_badge_atomic(user_id, &badge_id, now).await? {
                milestone = Some(badge_id);
            }
        }

        Ok((new_count, milestone))
    }

    // ─── Challenge Definitions ───────────────────────────────────

    pub async fn get_challenge(
        &self,
        challenge_id: &str,
    ) -> Result<Option<ChallengeDefinition>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CHALLENGES)
            .obj()
            .one(challenge_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn upsert_challenge(&self, challenge: &ChallengeDefinition) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CHALLENGES)
            .document_id(&challenge.challenge_id)
            .object(challenge)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Challenge Attempts ──────────────────────────────────────

    /// Get an attempt by its composite key.
    pub async fn get_attempt(
        &self,
        user_id: u64,
        challenge_id: &str,
        day: &str,
    ) -> Result<Option<ChallengeAttempt>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ATTEMPTS)
            .obj()
            .one(&ChallengeAttempt::doc_id(user_id, challenge_id, day))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create an attempt row, failing if one already exists for the
    /// composite key. The create is the duplicate-start guard; two
    /// racing starts cannot both succeed.
    pub async fn insert_attempt(&self, attempt: &ChallengeAttempt) -> Result<(), AppError> {
        let doc_id = ChallengeAttempt::doc_id(attempt.user_id, attempt.challenge_id.as_str(), &attempt.day);
        let result: Result<ChallengeAttempt, _> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::ATTEMPTS)
            .document_id(&doc_id)
            .object(attempt)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().to_lowercase().contains("already exists") => {
                Err(AppError::DuplicateStart(attempt.challenge_id.clone()))
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    /// Direct attempt write, used by tests to seed history rows.
    pub async fn upsert_attempt(&self, attempt: &ChallengeAttempt) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ATTEMPTS)
            .document_id(ChallengeAttempt::doc_id(
                attempt.user_id,
                &attempt.challenge_id,
                &attempt.day,
            ))
            .object(attempt)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Transactionally merge a partial progress payload into an active
    /// attempt and return the merged row.
    pub async fn merge_attempt_progress(
        &self,
        user_id: u64,
        challenge_id: &str,
        day: &str,
        partial: &ProgressMap,
    ) -> Result<ChallengeAttempt, AppError> {
        let doc_id = ChallengeAttempt::doc_id(user_id, challenge_id, day);

        for attempt_no in 1..=TXN_MAX_ATTEMPTS {
            let mut transaction = self
                .get_client()?
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let mut attempt = self
                .get_attempt(user_id, challenge_id, day)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("No attempt for {} on {}", challenge_id, day))
                })?;

            if attempt.is_terminal() {
                let _ = transaction.rollback().await;
                return Err(AppError::Validation(format!(
                    "Attempt for {} on {} is no longer active",
                    challenge_id, day
                )));
            }

            attempt.merge_progress(partial.clone());

            self.get_client()?
                .fluent()
                .update()
                .in_col(collections::ATTEMPTS)
                .document_id(&doc_id)
                .object(&attempt)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add attempt to transaction: {}", e))
                })?;

            match transaction.commit().await {
                Ok(_) => return Ok(attempt),
                Err(e) if attempt_no < TXN_MAX_ATTEMPTS => {
                    tracing::debug!(user_id, challenge_id, attempt_no, error = %e,
                        "Progress merge contended, retrying");
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Progress transaction failed: {}",
                        e
                    )))
                }
            }
        }
        unreachable!("progress transaction loop always returns")
    }

    /// The completion transition: flip the attempt to `completed` and
    /// apply the challenge reward to the user row, as one transaction.
    ///
    /// The write is conditioned on the attempt still being `active`; a
    /// caller that finds it already terminal returns `Ok(None)` and
    /// applies nothing. Only the winner of a race performs the reward.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_attempt_atomic(
        &self,
        user_id: u64,
        challenge_id: &str,
        day: &str,
        streak_count: u32,
        xp_reward: u32,
        coin_reward: u32,
        now: &str,
    ) -> Result<Option<(ChallengeAttempt, RewardOutcome)>, AppError> {
        let doc_id = ChallengeAttempt::doc_id(user_id, challenge_id, day);

        for attempt_no in 1..=TXN_MAX_ATTEMPTS {
            let mut transaction = self
                .get_client()?
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            // Compare: the guard is the status field, re-read each attempt.
            let mut attempt = self
                .get_attempt(user_id, challenge_id, day)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("No attempt for {} on {}", challenge_id, day))
                })?;

            if attempt.status != AttemptStatus::Active {
                // Lost the race (or already completed earlier): the
                // winning transition applied the reward. Not an error.
                let _ = transaction.rollback().await;
                tracing::debug!(user_id, challenge_id, day, "Completion already applied, skipping");
                return Ok(None);
            }

            let mut user = self
                .get_user(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

            // Set: terminal state, reward, and attempt streak in one unit.
            attempt.status = AttemptStatus::Completed;
            attempt.completed_at = Some(now.to_string());
            attempt.streak_count = streak_count;
            let outcome = user.grant(xp_reward, coin_reward);

            self.get_client()?
                .fluent()
                .update()
                .in_col(collections::ATTEMPTS)
                .document_id(&doc_id)
                .object(&attempt)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add attempt to transaction: {}", e))
                })?;

            self.get_client()?
                .fluent()
                .update()
                .in_col(collections::USERS)
                .document_id(user_id.to_string())
                .object(&user)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add user to transaction: {}", e))
                })?;

            match transaction.commit().await {
                Ok(_) => {
                    tracing::info!(
                        user_id,
                        challenge_id,
                        day,
                        xp_reward,
                        coin_reward,
                        streak_count,
                        "Challenge completed"
                    );
                    return Ok(Some((attempt, outcome)));
                }
                Err(e) if attempt_no < TXN_MAX_ATTEMPTS => {
                    tracing::debug!(user_id, challenge_id, attempt_no, error = %e,
                        "Completion commit contended, retrying");
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Completion transaction failed: {}",
                        e
                    )))
                }
            }
        }
        unreachable!("completion transaction loop always returns")
    }

    /// Explicit expiry of an active attempt to `failed`. Same guard as
    /// completion; no reward is applied.
    pub async fn fail_attempt_atomic(
        &self,
        user_id: u64,
        challenge_id: &str,
        day: &str,
    ) -> Result<Option<ChallengeAttempt>, AppError> {
        let doc_id = ChallengeAttempt::doc_id(user_id, challenge_id, day);

        for attempt_no in 1..=TXN_MAX_ATTEMPTS {
            let mut transaction = self
                .get_client()?
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let mut attempt = self
                .get_attempt(user_id, challenge_id, day)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("No attempt for {} on {}", challenge_id, day))
                })?;

            if attempt.status != AttemptStatus::Active {
                let _ = transaction.rollback().await;
                return Ok(None);
            }

            attempt.status = AttemptStatus::Failed;

            self.get_client()?
                .fluent()
                .update()
                .in_col(collections::ATTEMPTS)
                .document_id(&doc_id)
                .object(&attempt)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add attempt to transaction: {}", e))
                })?;

            match transaction.commit().await {
                Ok(_) => {
                    tracing::info!(user_id, challenge_id, day, "Attempt expired");
                    return Ok(Some(attempt));
                }
                Err(e) if attempt_no < TXN_MAX_ATTEMPTS => {
                    tracing::debug!(user_id, challenge_id, attempt_no, error = %e,
                        "Expiry commit contended, retrying");
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Expiry transaction failed: {}",
                        e
                    )))
                }
            }
        }
        unreachable!("expiry transaction loop always returns")
    }

    // ─── Conversations & Messages ────────────────────────────────

    pub async fn get_conversation(
        &self,
        conversation_id: u64,
    ) -> Result<Option<Conversation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CONVERSATIONS)
            .obj()
            .one(&conversation_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CONVERSATIONS)
            .document_id(conversation.conversation_id.to_string())
            .object(conversation)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Persist a chat message. Delivery to the room happens only after
    /// this write resolves, so in-room ordering follows commit order.
    pub async fn append_chat_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::MESSAGES)
            .document_id(&message.message_id)
            .object(message)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
