// SPDX-License-Identifier: MIT

//! Challenge definitions and per-day attempt state.
//!
//! Requirements are tagged variants rather than free-form JSON so the
//! evaluator can match exhaustively; a payload that does not fit one of
//! the variants fails deserialization before any state is touched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single declarative requirement for a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Requirement {
    /// Numeric threshold: observed value must be >= this.
    AtLeast(f64),
    /// Boolean flag: observed value must equal this.
    Flag(bool),
    /// Array subset: observed items must be a superset of these.
    Includes(Vec<String>),
}

/// An observed progress value reported by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Progress {
    Count(f64),
    Flag(bool),
    Items(Vec<String>),
}

/// Mapping of requirement key to observed value.
pub type ProgressMap = BTreeMap<String, Progress>;

/// Key carrying the explicit completion flag when a challenge has no
/// declarative requirements.
pub const COMPLETED_KEY: &str = "completed";

/// A challenge as configured by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeDefinition {
    /// Challenge ID (also used as document ID)
    pub challenge_id: String,
    pub title: String,
    /// Empty map means "explicit completion flag only".
    #[serde(default)]
    pub requirements: BTreeMap<String, Requirement>,
    #[serde(default)]
    pub xp_reward: u32,
    #[serde(default)]
    pub coin_reward: u32,
    /// Badge granted on first completion, if any
    #[serde(default)]
    pub badge_unlock: Option<String>,
    /// Daily challenges carry an attempt-scoped streak day to day
    #[serde(default)]
    pub is_daily: bool,
}

/// Lifecycle state of an attempt. `Active` is the only state that
/// accepts progress updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Active,
    Completed,
    Failed,
}

/// One user's instance of attempting a challenge on a calendar day.
///
/// The document ID is the composite key (user, challenge, day), which
/// is what enforces at-most-one attempt per user per challenge per day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeAttempt {
    pub user_id: u64,
    pub challenge_id: String,
    /// Day key (`YYYY-MM-DD`)
    pub day: String,
    pub status: AttemptStatus,
    #[serde(default)]
    pub progress: ProgressMap,
    /// Attempt-scoped streak, carried forward across consecutive
    /// completed days of the same challenge
    #[serde(default)]
    pub streak_count: u32,
    /// RFC3339
    pub started_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl ChallengeAttempt {
    /// Composite document ID for an attempt.
    pub fn doc_id(user_id: u64, challenge_id: &str, day: &str) -> String {
        format!("{}_{}_{}", user_id, challenge_id, day)
    }

    /// Shallow-merge a partial progress payload; new keys overwrite old.
    pub fn merge_progress(&mut self, partial: ProgressMap) {
        for (key, value) in partial {
            self.progress.insert(key, value);
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, AttemptStatus::Completed | AttemptStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_attempt() -> ChallengeAttempt {
        ChallengeAttempt {
            user_id: 7,
            challenge_id: "daily-walk".to_string(),
            day: "2024-05-01".to_string(),
            status: AttemptStatus::Active,
            progress: ProgressMap::new(),
            streak_count: 1,
            started_at: "2024-05-01T08:00:00Z".to_string(),
            completed_at: None,
        }
    }

    #[test]
    fn test_doc_id_composite_key() {
        assert_eq!(
            ChallengeAttempt::doc_id(7, "daily-walk", "2024-05-01"),
            "7_daily-walk_2024-05-01"
        );
    }

    #[test]
    fn test_merge_progress_overwrites_and_keeps() {
        let mut attempt = make_attempt();
        attempt.merge_progress(ProgressMap::from([
            ("minutes".to_string(), Progress::Count(5.0)),
            ("outside".to_string(), Progress::Flag(false)),
        ]));
        attempt.merge_progress(ProgressMap::from([(
            "minutes".to_string(),
            Progress::Count(12.0),
        )]));

        assert_eq!(attempt.progress.get("minutes"), Some(&Progress::Count(12.0)));
        assert_eq!(attempt.progress.get("outside"), Some(&Progress::Flag(false)));
    }

    #[test]
    fn test_requirement_wire_format() {
        let req: Requirement =
            serde_json::from_str(r#"{"kind":"at_least","value":10}"#).unwrap();
        assert_eq!(req, Requirement::AtLeast(10.0));

        let req: Requirement =
            serde_json::from_str(r#"{"kind":"includes","value":["a","b"]}"#).unwrap();
        assert_eq!(req, Requirement::Includes(vec!["a".into(), "b".into()]));

        // Shapeless payloads are rejected at the serde boundary.
        assert!(serde_json::from_str::<Requirement>(r#"{"kind":"at_least","value":"ten"}"#).is_err());
    }

    #[test]
    fn test_terminal_states() {
        let mut attempt = make_attempt();
        assert!(!attempt.is_terminal());
        attempt.status = AttemptStatus::Completed;
        assert!(attempt.is_terminal());
        attempt.status = AttemptStatus::Failed;
        assert!(attempt.is_terminal());
    }
}
