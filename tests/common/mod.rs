// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use questline::config::Config;
use questline::db::FirestoreDb;
use questline::models::{ChallengeDefinition, Requirement, User};
use questline::routes::create_router;
use questline::time_utils::{Clock, SystemClock};
use questline::AppState;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Fixed clock for driving time-dependent logic in tests.
#[allow(dead_code)]
#[derive(Clone)]
pub struct ManualClock(pub DateTime<Utc>);

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let state = Arc::new(AppState::new(
        config,
        test_db_offline(),
        Arc::new(SystemClock),
    ));
    (create_router(state.clone()), state)
}

/// App wired to the emulator, with a manual clock.
#[allow(dead_code)]
pub async fn create_emulator_app(clock: ManualClock) -> Arc<AppState> {
    let config = Config::test_default();
    Arc::new(AppState::new(config, test_db().await, Arc::new(clock)))
}

/// Session token for a test user.
#[allow(dead_code)]
pub fn auth_token(user_id: u64) -> String {
    let config = Config::test_default();
    questline::middleware::auth::create_jwt(user_id, &config.jwt_signing_key)
        .expect("Failed to create test JWT")
}

/// Unique-enough ID for emulator test isolation.
#[allow(dead_code)]
pub fn unique_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
        % 1_000_000_000_000
}

/// Seed a fresh user row.
#[allow(dead_code)]
pub async fn seed_user(db: &FirestoreDb, user_id: u64) -> User {
    let user = User {
        user_id,
        username: format!("user-{}", user_id),
        xp: 0,
        level: 1,
        coins: 0,
        streak_count: 0,
        last_activity_date: None,
        badges: vec![],
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    db.upsert_user(&user).await.expect("Failed to seed user");
    user
}

/// Seed a challenge with a single numeric requirement.
#[allow(dead_code)]
pub async fn seed_minutes_challenge(
    db: &FirestoreDb,
    challenge_id: &str,
    minutes: f64,
    xp_reward: u32,
    coin_reward: u32,
) -> ChallengeDefinition {
    let challenge = ChallengeDefinition {
        challenge_id: challenge_id.to_string(),
        title: format!("Spend {} minutes", minutes),
        requirements: BTreeMap::from([(
            "minutes".to_string(),
            Requirement::AtLeast(minutes),
        )]),
        xp_reward,
        coin_reward,
        badge_unlock: None,
        is_daily: true,
    };
    db.upsert_challenge(&challenge)
        .await
        .expect("Failed to seed challenge");
    challenge
}
