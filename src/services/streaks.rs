// SPDX-License-Identifier: MIT

//! User-level streak tracking.
//!
//! The user streak counts consecutive days with qualifying activity.
//! Milestone counts unlock badges through the (idempotent) badge path,
//! so two racing increments that both observe a milestone count cannot
//! double-award.
//!
//! Per-challenge streaks are a separate notion derived by the challenge
//! state machine from the previous day's attempt row.

use crate::db::FirestoreDb;
use crate::error::Result;
use crate::models::StreakAction;
use crate::time_utils::{format_utc_rfc3339, today_key, Clock};
use serde::Serialize;
use std::sync::Arc;

/// Result of advancing the user streak.
#[derive(Debug, Clone, Serialize)]
pub struct StreakOutcome {
    pub streak_count: u32,
    /// Milestone badge newly awarded by this advance, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_badge: Option<String>,
}

#[derive(Clone)]
pub struct StreakTracker {
    db: FirestoreDb,
    clock: Arc<dyn Clock>,
}

impl StreakTracker {
    pub fn new(db: FirestoreDb, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Increment or reset the user streak.
    ///
    /// An increment stamps `last_activity_date = today` and, when the
    /// new count lands exactly on a milestone, awards the milestone
    /// badge.
    pub async fn advance_streak(&self, user_id: u64, action: StreakAction) -> Result<StreakOutcome> {
        let today = today_key(self.clock.as_ref());
        let now = format_utc_rfc3339(self.clock.now_utc());

        let (streak_count, milestone_badge) = self
            .db
            .advance_streak_atomic(user_id, action, &today, &now)
            .await?;

        if let Some(badge) = &milestone_badge {
            tracing::info!(user_id, streak_count, badge = %badge, "Streak milestone reached");
        }

        Ok(StreakOutcome {
            streak_count,
            milestone_badge,
        })
    }
}
