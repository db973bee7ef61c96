// SPDX-License-Identifier: MIT

//! Challenge state machine.
//!
//! Owns the per-user-per-challenge-per-day lifecycle:
//! `not_started -> active -> {completed | failed}`, where `not_started`
//! is synthetic (no row exists yet). The completion transition is a
//! compare-and-set on the attempt's status at the storage layer; a
//! progress update that loses that race reports completion without a
//! reward, because the winner already applied it.

use crate::db::FirestoreDb;
use crate::error::{AppError, Result};
use crate::models::{
    AttemptStatus, ChallengeAttempt, ChallengeDefinition, ProgressMap, RewardOutcome,
};
use crate::services::requirements::requirements_satisfied;
use crate::services::rewards::RewardLedger;
use crate::time_utils::{format_utc_rfc3339, previous_day_key, Clock};
use std::sync::Arc;

/// Result of a progress update.
#[derive(Debug, Clone)]
pub struct ProgressOutcome {
    pub attempt: ChallengeAttempt,
    pub completed: bool,
    /// Present only on the update that actually performed the
    /// completion transition.
    pub reward: Option<RewardOutcome>,
    /// Deltas this completion applied (zero when `reward` is absent).
    pub xp_awarded: u32,
    pub coins_awarded: u32,
    /// Badge unlocked by this completion, if the challenge has one and
    /// this caller won the transition.
    pub badge_unlocked: Option<String>,
}

#[derive(Clone)]
pub struct ChallengeService {
    db: FirestoreDb,
    ledger: RewardLedger,
    clock: Arc<dyn Clock>,
}

impl ChallengeService {
    pub fn new(db: FirestoreDb, ledger: RewardLedger, clock: Arc<dyn Clock>) -> Self {
        Self { db, ledger, clock }
    }

    /// Start a challenge for (user, challenge, day).
    ///
    /// Creates the `active` attempt row; a second start for the same
    /// day is rejected as a duplicate, not silently absorbed.
    pub async fn start_challenge(
        &self,
        user_id: u64,
        challenge_id: &str,
        day: &str,
    ) -> Result<ChallengeAttempt> {
        let challenge = self.require_challenge(challenge_id).await?;

        let streak_count = self
            .carried_streak(user_id, &challenge, day)
            .await?;

        let attempt = ChallengeAttempt {
            user_id,
            challenge_id: challenge_id.to_string(),
            day: day.to_string(),
            status: AttemptStatus::Active,
            progress: ProgressMap::new(),
            streak_count,
            started_at: format_utc_rfc3339(self.clock.now_utc()),
            completed_at: None,
        };

        self.db.insert_attempt(&attempt).await?;
        tracing::info!(user_id, challenge_id, day, "Challenge started");
        Ok(attempt)
    }

    /// Merge a partial progress payload into the day's attempt, then
    /// run the completion check.
    ///
    /// The whole satisfied-path behaves as a single logical transition:
    /// status flip and reward commit together, and only the winner of a
    /// concurrent race emits a reward. Badge unlock and the attempt's
    /// history row are then visible to both callers.
    pub async fn update_progress(
        &self,
        user_id: u64,
        challenge_id: &str,
        day: &str,
        partial: ProgressMap,
    ) -> Result<ProgressOutcome> {
        if partial.is_empty() {
            return Err(AppError::Validation("Empty progress payload".to_string()));
        }

        let challenge = self.require_challenge(challenge_id).await?;

        let attempt = self
            .db
            .merge_attempt_progress(user_id, challenge_id, day, &partial)
            .await?;

        if !requirements_satisfied(&attempt.progress, &challenge.requirements) {
            return Ok(ProgressOutcome {
                attempt,
                completed: false,
                reward: None,
                xp_awarded: 0,
                coins_awarded: 0,
                badge_unlocked: None,
            });
        }

        let streak_count = self.carried_streak(user_id, &challenge, day).await?;
        let now = format_utc_rfc3339(self.clock.now_utc());

        match self
            .db
            .complete_attempt_atomic(
                user_id,
                challenge_id,
                day,
                streak_count,
                challenge.xp_reward,
                challenge.coin_reward,
                &now,
            )
            .await?
        {
            Some((completed_attempt, reward)) => {
                // The transition is committed; the badge unlock rides on
                // the idempotent badge path afterwards.
                let mut badge_unlocked = None;
                if let Some(badge_id) = &challenge.badge_unlock {
                    if self.ledger.award_badge(user_id, badge_id).await? {
                        badge_unlocked = Some(badge_id.clone());
                    }
                }

                Ok(ProgressOutcome {
                    attempt: completed_attempt,
                    completed: true,
                    reward: Some(reward),
                    xp_awarded: challenge.xp_reward,
                    coins_awarded: challenge.coin_reward,
                    badge_unlocked,
                })
            }
            None => {
                // A concurrent update won the transition. Report the
                // completed row without re-applying any side effects.
                let attempt = self
                    .db
                    .get_attempt(user_id, challenge_id, day)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("No attempt for {} on {}", challenge_id, day))
                    })?;
                Ok(ProgressOutcome {
                    attempt,
                    completed: true,
                    reward: None,
                    xp_awarded: 0,
                    coins_awarded: 0,
                    badge_unlocked: None,
                })
            }
        }
    }

    /// Expire an active attempt to `failed` (duration-bounded
    /// challenges whose window lapsed). No reward is applied; a lost
    /// race against completion leaves the completed row untouched.
    pub async fn fail_attempt(
        &self,
        user_id: u64,
        challenge_id: &str,
        day: &str,
    ) -> Result<Option<ChallengeAttempt>> {
        self.db.fail_attempt_atomic(user_id, challenge_id, day).await
    }

    async fn require_challenge(&self, challenge_id: &str) -> Result<ChallengeDefinition> {
        self.db
            .get_challenge(challenge_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", challenge_id)))
    }

    /// Attempt-scoped streak for `day`: continues from yesterday's
    /// completed attempt of the same challenge, otherwise restarts at 1.
    /// Non-daily challenges do not carry a streak across days.
    async fn carried_streak(
        &self,
        user_id: u64,
        challenge: &ChallengeDefinition,
        day: &str,
    ) -> Result<u32> {
        if !challenge.is_daily {
            return Ok(1);
        }

        let Some(yesterday) = previous_day_key(day) else {
            return Err(AppError::Validation(format!("Malformed day key: {}", day)));
        };

        let carried = match self
            .db
            .get_attempt(user_id, &challenge.challenge_id, &yesterday)
            .await?
        {
            Some(prev) if prev.status == AttemptStatus::Completed => prev.streak_count + 1,
            _ => 1,
        };
        Ok(carried)
    }
}
