// SPDX-License-Identifier: MIT

//! Reward ledger: the single write path for XP, coins, and badges.
//!
//! The ledger mutates the persisted user row and nothing else; emitting
//! notification events for an applied reward is the caller's job, so a
//! persistence failure never leaves a half-announced reward.

use crate::db::FirestoreDb;
use crate::error::Result;
use crate::models::RewardOutcome;
use crate::time_utils::format_utc_rfc3339;

#[derive(Clone)]
pub struct RewardLedger {
    db: FirestoreDb,
}

impl RewardLedger {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    /// Apply an XP/coin delta in one atomic read-modify-write.
    ///
    /// Level is recomputed from the new XP total; crossing a level
    /// boundary credits the level-up coin bonus in the same unit.
    pub async fn apply_reward(
        &self,
        user_id: u64,
        xp_delta: u32,
        coin_delta: u32,
    ) -> Result<RewardOutcome> {
        self.db
            .apply_reward_atomic(user_id, xp_delta, coin_delta)
            .await
    }

    /// Award a badge; a no-op returning `false` if already owned.
    pub async fn award_badge(&self, user_id: u64, badge_id: &str) -> Result<bool> {
        let now = format_utc_rfc3339(chrono::Utc::now());
        self.db.award_badge_atomic(user_id, badge_id, &now).await
    }
}
