// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod challenge;
pub mod chat;
pub mod user;

pub use challenge::{
    AttemptStatus, ChallengeAttempt, ChallengeDefinition, Progress, ProgressMap, Requirement,
};
pub use chat::{ChatMessage, Conversation, MessageType};
pub use user::{Badge, RewardOutcome, StreakAction, User};
