// SPDX-License-Identifier: MIT

//! Questline: gamification state engine and real-time event fan-out.
//!
//! This crate owns the hard parts of the platform: evaluating challenge
//! requirements, advancing XP/level/coins/badges exactly once per
//! qualifying transition, maintaining day streaks, and fanning domain
//! events out to the correct live connections through room-based
//! multicast.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use realtime::{ConnectionHub, EventDispatcher};
use services::{ChallengeService, RewardLedger, StreakTracker};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub clock: Arc<dyn Clock>,
    pub hub: Arc<ConnectionHub>,
    pub dispatcher: Arc<EventDispatcher>,
    pub challenges: ChallengeService,
    pub rewards: RewardLedger,
    pub streaks: StreakTracker,
}

impl AppState {
    /// Wire up the full service graph over a database handle.
    pub fn new(config: Config, db: FirestoreDb, clock: Arc<dyn Clock>) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&hub),
            db.clone(),
            Arc::clone(&clock),
        ));
        let rewards = RewardLedger::new(db.clone());
        let challenges = ChallengeService::new(db.clone(), rewards.clone(), Arc::clone(&clock));
        let streaks = StreakTracker::new(db.clone(), Arc::clone(&clock));

        Self {
            config,
            db,
            clock,
            hub,
            dispatcher,
            challenges,
            rewards,
            streaks,
        }
    }
}
