// SPDX-License-Identifier: MIT

//! Questline API server.
//!
//! Gamification state engine and real-time event fan-out for the
//! goals-and-challenges platform.

use questline::{config::Config, db::FirestoreDb, time_utils::SystemClock, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Questline API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Build shared state (hub, dispatcher, services)
    let state = Arc::new(AppState::new(config.clone(), db, Arc::new(SystemClock)));

    // Daily reminder sweep runs on its own timer, independent of any
    // connection's lifecycle.
    Arc::clone(&state.dispatcher)
        .spawn_reminder_sweep(config.reminder_hour_utc, config.reminder_active_days);
    tracing::info!(
        hour_utc = config.reminder_hour_utc,
        "Reminder sweep scheduled"
    );

    // Build router
    let app = questline::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("questline=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
