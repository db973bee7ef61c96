//! User model for storage and API.
//!
//! All reward mutations are expressed as methods on [`User`] so the
//! database layer can run them inside a transaction on a freshly-read
//! row, mirroring how attempt completion is applied.

use serde::{Deserialize, Serialize};

/// XP required per level. `level = xp / 100 + 1`.
pub const XP_PER_LEVEL: u32 = 100;

/// Coins credited on level-up: `new_level * LEVEL_UP_COIN_FACTOR`.
pub const LEVEL_UP_COIN_FACTOR: u32 = 10;

/// Streak counts that unlock a milestone badge.
pub const STREAK_MILESTONES: [u32; 4] = [7, 30, 100, 365];

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// User ID (also used as document ID)
    pub user_id: u64,
    /// Display name
    pub username: String,
    /// Lifetime experience points (monotonic)
    #[serde(default)]
    pub xp: u32,
    /// Derived level, kept persisted for cheap reads
    #[serde(default = "default_level")]
    pub level: u32,
    /// Spendable coins
    #[serde(default)]
    pub coins: u32,
    /// Consecutive-day activity streak
    #[serde(default)]
    pub streak_count: u32,
    /// Day key (`YYYY-MM-DD`) of the last streak-qualifying activity
    #[serde(default)]
    pub last_activity_date: Option<String>,
    /// Earned badges, unique by `badge_id`
    #[serde(default)]
    pub badges: Vec<Badge>,
    /// When the user record was created (RFC3339)
    pub created_at: String,
}

fn default_level() -> u32 {
    1
}

/// A uniquely-identified achievement marker attached to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Badge {
    pub badge_id: String,
    /// Award timestamp (RFC3339)
    pub awarded_at: String,
}

/// Level derived from total XP.
pub fn level_for_xp(xp: u32) -> u32 {
    xp / XP_PER_LEVEL + 1
}

/// Result of applying an XP/coin delta to a user.
#[derive(Debug, Clone, Serialize)]
pub struct RewardOutcome {
    pub xp: u32,
    pub level: u32,
    pub coins: u32,
    pub leveled_up: bool,
}

/// Direction for the user-level streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakAction {
    Increment,
    Reset,
}

impl User {
    /// Apply an XP and coin delta, recomputing the level and crediting
    /// the level-up coin bonus when a level boundary is crossed.
    pub fn grant(&mut self, xp_delta: u32, coin_delta: u32) -> RewardOutcome {
        let old_level = self.level;
        self.xp += xp_delta;
        self.coins += coin_delta;
        self.level = level_for_xp(self.xp);

        let leveled_up = self.level > old_level;
        if leveled_up {
            self.coins += self.level * LEVEL_UP_COIN_FACTOR;
        }

        RewardOutcome {
            xp: self.xp,
            level: self.level,
            coins: self.coins,
            leveled_up,
        }
    }

    /// Append a badge unless already owned. Returns `true` if awarded.
    pub fn add_badge(&mut self, badge_id: &str, now: &str) -> bool {
        if self.badges.iter().any(|b| b.badge_id == badge_id) {
            return false;
        }
        self.badges.push(Badge {
            badge_id: badge_id.to_string(),
            awarded_at: now.to_string(),
        });
        true
    }

    /// Advance or reset the user-level streak. Returns the new count.
    pub fn advance_streak(&mut self, action: StreakAction, today: &str) -> u32 {
        match action {
            StreakAction::Increment => {
                self.streak_count += 1;
                self.last_activity_date = Some(today.to_string());
            }
            StreakAction::Reset => {
                self.streak_count = 0;
            }
        }
        self.streak_count
    }
}

/// Badge identifier for a streak milestone count.
pub fn streak_badge_id(count: u32) -> String {
    format!("streak-{}", count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user(xp: u32, coins: u32) -> User {
        User {
            user_id: 1,
            username: "tester".to_string(),
            xp,
            level: level_for_xp(xp),
            coins,
            streak_count: 0,
            last_activity_date: None,
            badges: vec![],
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_level_invariant_holds_across_grants() {
        let mut user = make_user(0, 0);
        for delta in [5, 40, 54, 1, 99, 301] {
            user.grant(delta, 0);
            assert_eq!(user.level, user.xp / XP_PER_LEVEL + 1);
        }
    }

    #[test]
    fn test_level_up_credits_bonus_coins() {
        // 95 XP -> +10 crosses into level 2: 20 bonus coins on top of the
        // challenge's own 5 coin reward.
        let mut user = make_user(95, 0);
        let outcome = user.grant(10, 5);

        assert_eq!(outcome.xp, 105);
        assert_eq!(outcome.level, 2);
        assert!(outcome.leveled_up);
        assert_eq!(outcome.coins, 5 + 2 * LEVEL_UP_COIN_FACTOR);
    }

    #[test]
    fn test_no_level_up_within_level() {
        let mut user = make_user(10, 3);
        let outcome = user.grant(20, 0);
        assert!(!outcome.leveled_up);
        assert_eq!(outcome.level, 1);
        assert_eq!(outcome.coins, 3);
    }

    #[test]
    fn test_add_badge_idempotent() {
        let mut user = make_user(0, 0);
        assert!(user.add_badge("early-bird", "2024-01-02T00:00:00Z"));
        assert!(!user.add_badge("early-bird", "2024-01-03T00:00:00Z"));
        assert_eq!(user.badges.len(), 1);
        assert_eq!(user.badges[0].awarded_at, "2024-01-02T00:00:00Z");
    }

    #[test]
    fn test_advance_streak_increment_and_reset() {
        let mut user = make_user(0, 0);
        assert_eq!(user.advance_streak(StreakAction::Increment, "2024-05-01"), 1);
        assert_eq!(user.advance_streak(StreakAction::Increment, "2024-05-02"), 2);
        assert_eq!(user.last_activity_date.as_deref(), Some("2024-05-02"));
        assert_eq!(user.advance_streak(StreakAction::Reset, "2024-05-03"), 0);
        // Reset leaves the last activity date untouched.
        assert_eq!(user.last_activity_date.as_deref(), Some("2024-05-02"));
    }
}
