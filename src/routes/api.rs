// SPDX-License-Identifier: MIT

//! API routes for authenticated users.
//!
//! These are the synchronous entry points into the gamification core,
//! invoked by the platform's CRUD layer. State mutation happens first;
//! only an applied mutation is fanned out through the dispatcher.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{ChallengeAttempt, ProgressMap, RewardOutcome, StreakAction, User};
use crate::realtime::events::{CelebrationPayload, LevelUpPayload};
use crate::time_utils::today_key;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/challenges/{challenge_id}/start", post(start_challenge))
        .route(
            "/api/challenges/{challenge_id}/progress",
            post(update_progress),
        )
        .route("/api/xp", post(add_xp))
        .route("/api/streak", post(advance_streak))
        .route("/api/badges", post(award_badge))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user snapshot.
#[derive(Serialize)]
pub struct UserResponse {
    pub user_id: u64,
    pub username: String,
    pub xp: u32,
    pub level: u32,
    pub coins: u32,
    pub streak_count: u32,
    pub badges: Vec<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            xp: user.xp,
            level: user.level,
            coins: user.coins,
            streak_count: user.streak_count,
            badges: user.badges.into_iter().map(|b| b.badge_id).collect(),
        }
    }
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .db
        .get_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    Ok(Json(profile.into()))
}

// ─── Challenges ──────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct StartChallengeRequest {
    /// Day key; defaults to today (UTC).
    day: Option<String>,
}

#[derive(Serialize)]
struct AttemptResponse {
    attempt: ChallengeAttempt,
}

/// Start a challenge for today (or an explicit day).
///
/// Responds 409 if an attempt already exists for the day.
async fn start_challenge(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(challenge_id): Path<String>,
    body: Option<Json<StartChallengeRequest>>,
) -> Result<Json<AttemptResponse>> {
    let day = resolve_day(&state, body.and_then(|Json(b)| b.day))?;

    let attempt = state
        .challenges
        .start_challenge(user.user_id, &challenge_id, &day)
        .await?;

    Ok(Json(AttemptResponse { attempt }))
}

#[derive(Deserialize)]
struct UpdateProgressRequest {
    day: Option<String>,
    progress: ProgressMap,
}

#[derive(Serialize)]
struct UpdateProgressResponse {
    attempt: ChallengeAttempt,
    completed: bool,
    reward_applied: Option<RewardOutcome>,
}

/// Merge partial progress and run the completion check.
///
/// Exactly one concurrent caller performs the completion transition;
/// the others see `completed: true` with no reward of their own.
async fn update_progress(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(challenge_id): Path<String>,
    Json(body): Json<UpdateProgressRequest>,
) -> Result<Json<UpdateProgressResponse>> {
    let day = resolve_day(&state, body.day)?;

    let outcome = state
        .challenges
        .update_progress(user.user_id, &challenge_id, &day, body.progress)
        .await?;

    // Mutation committed; now fan out what actually happened.
    if let Some(reward) = &outcome.reward {
        state.dispatcher.celebrate_completion(
            user.user_id,
            CelebrationPayload {
                challenge_id: challenge_id.clone(),
                xp_awarded: outcome.xp_awarded,
                coins_awarded: outcome.coins_awarded,
                streak_count: outcome.attempt.streak_count,
                badge_unlocked: outcome.badge_unlocked.clone(),
            },
        );
        if reward.leveled_up {
            state.dispatcher.celebrate_level_up(
                user.user_id,
                LevelUpPayload {
                    xp: reward.xp,
                    level: reward.level,
                    coins: reward.coins,
                },
            );
        }
    }

    Ok(Json(UpdateProgressResponse {
        attempt: outcome.attempt,
        completed: outcome.completed,
        reward_applied: outcome.reward,
    }))
}

// ─── Rewards ─────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct AddXpRequest {
    #[validate(range(min = 1, max = 10_000))]
    amount: u32,
    #[serde(default)]
    coins: u32,
}

/// Apply an XP (and optional coin) delta to the calling user.
async fn add_xp(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AddXpRequest>,
) -> Result<Json<RewardOutcome>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let outcome = state
        .rewards
        .apply_reward(user.user_id, body.amount, body.coins)
        .await?;

    if outcome.leveled_up {
        state.dispatcher.celebrate_level_up(
            user.user_id,
            LevelUpPayload {
                xp: outcome.xp,
                level: outcome.level,
                coins: outcome.coins,
            },
        );
    }

    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct AdvanceStreakRequest {
    action: StreakAction,
}

#[derive(Serialize)]
struct StreakResponse {
    streak_count: u32,
}

/// Advance or reset the user-level day streak.
async fn advance_streak(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AdvanceStreakRequest>,
) -> Result<Json<StreakResponse>> {
    let outcome = state
        .streaks
        .advance_streak(user.user_id, body.action)
        .await?;

    if let Some(badge_id) = outcome.milestone_badge {
        state
            .dispatcher
            .celebrate_streak_milestone(user.user_id, outcome.streak_count, badge_id);
    }

    Ok(Json(StreakResponse {
        streak_count: outcome.streak_count,
    }))
}

#[derive(Deserialize, Validate)]
struct AwardBadgeRequest {
    #[validate(length(min = 1, max = 64))]
    badge_id: String,
}

#[derive(Serialize)]
struct AwardBadgeResponse {
    awarded: bool,
}

/// Award a badge to the calling user. `awarded: false` means it was
/// already owned.
async fn award_badge(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AwardBadgeRequest>,
) -> Result<Json<AwardBadgeResponse>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let awarded = state
        .rewards
        .award_badge(user.user_id, &body.badge_id)
        .await?;

    Ok(Json(AwardBadgeResponse { awarded }))
}

/// Resolve an optional day key from the request, defaulting to today.
fn resolve_day(state: &AppState, day: Option<String>) -> Result<String> {
    match day {
        Some(day) => {
            if crate::time_utils::parse_day_key(&day).is_none() {
                return Err(AppError::Validation(format!("Malformed day key: {}", day)));
            }
            Ok(day)
        }
        None => Ok(today_key(state.clock.as_ref())),
    }
}
