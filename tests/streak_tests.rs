// SPDX-License-Identifier: MIT

//! User-level streak advancement and milestone badges.

use chrono::{TimeZone, Utc};
use questline::models::StreakAction;
use questline::services::StreakTracker;
use std::sync::Arc;

mod common;
use common::{seed_user, test_db, unique_id, ManualClock};

#[tokio::test]
async fn test_increment_and_reset() {
    require_emulator!();
    let db = test_db().await;
    let user_id = unique_id();
    seed_user(&db, user_id).await;

    let clock = ManualClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    let tracker = StreakTracker::new(db.clone(), Arc::new(clock));

    let outcome = tracker
        .advance_streak(user_id, StreakAction::Increment)
        .await
        .unwrap();
    assert_eq!(outcome.streak_count, 1);
    assert!(outcome.milestone_badge.is_none());

    let user = db.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.last_activity_date.as_deref(), Some("2024-06-01"));

    let outcome = tracker
        .advance_streak(user_id, StreakAction::Reset)
        .await
        .unwrap();
    assert_eq!(outcome.streak_count, 0);
}

#[tokio::test]
async fn test_milestone_badge_at_seven() {
    require_emulator!();
    let db = test_db().await;
    let user_id = unique_id();
    seed_user(&db, user_id).await;

    let clock = ManualClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    let tracker = StreakTracker::new(db.clone(), Arc::new(clock));

    let mut milestone = None;
    for _ in 0..7 {
        let outcome = tracker
            .advance_streak(user_id, StreakAction::Increment)
            .await
            .unwrap();
        milestone = outcome.milestone_badge;
    }
    assert_eq!(milestone.as_deref(), Some("streak-7"));

    let user = db.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.streak_count, 7);
    assert!(user.badges.iter().any(|b| b.badge_id == "streak-7"));

    // Counts between milestones award nothing.
    let outcome = tracker
        .advance_streak(user_id, StreakAction::Increment)
        .await
        .unwrap();
    assert_eq!(outcome.streak_count, 8);
    assert!(outcome.milestone_badge.is_none());
}
