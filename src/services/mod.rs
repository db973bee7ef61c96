// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod challenges;
pub mod requirements;
pub mod rewards;
pub mod streaks;

pub use challenges::{ChallengeService, ProgressOutcome};
pub use rewards::RewardLedger;
pub use streaks::{StreakOutcome, StreakTracker};
