// SPDX-License-Identifier: MIT

//! Fan-out topology, entirely in-process: these flows never touch the
//! persistence collaborator, so they run without the emulator.

use questline::realtime::events::{
    CelebrationPayload, ClientMessage, RoomId, ServerEvent,
};
use questline::realtime::{ConnectionHub, EventDispatcher};
use questline::time_utils::SystemClock;
use std::sync::Arc;
use tokio::sync::mpsc;

mod common;

fn dispatcher() -> (Arc<ConnectionHub>, EventDispatcher) {
    let hub = Arc::new(ConnectionHub::new());
    let dispatcher = EventDispatcher::new(
        Arc::clone(&hub),
        common::test_db_offline(),
        Arc::new(SystemClock),
    );
    (hub, dispatcher)
}

fn connect(
    hub: &ConnectionHub,
    user_id: u64,
) -> (
    questline::realtime::ConnectionId,
    mpsc::UnboundedReceiver<ServerEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (hub.register(user_id, tx), rx)
}

#[tokio::test]
async fn test_like_notifies_author_only() {
    let (hub, dispatcher) = dispatcher();
    let (conn_b, mut rx_b) = connect(&hub, 2); // actor
    let (_conn_a, mut rx_a) = connect(&hub, 1); // author

    dispatcher
        .handle_client_message(
            conn_b,
            2,
            ClientMessage::PostLiked {
                post_id: 99,
                author_id: 1,
            },
        )
        .await
        .unwrap();

    match rx_a.try_recv().expect("Author receives the interaction") {
        ServerEvent::PostInteraction {
            post_id, actor_id, ..
        } => {
            assert_eq!(post_id, 99);
            assert_eq!(actor_id, 2);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
    assert!(rx_a.try_recv().is_err(), "Exactly one event to the author");
    assert!(rx_b.try_recv().is_err(), "Nothing echoes to the actor");
}

#[tokio::test]
async fn test_self_like_produces_no_event() {
    let (hub, dispatcher) = dispatcher();
    let (conn_a, mut rx_a) = connect(&hub, 1);

    dispatcher
        .handle_client_message(
            conn_a,
            1,
            ClientMessage::PostLiked {
                post_id: 99,
                author_id: 1,
            },
        )
        .await
        .unwrap();

    assert!(rx_a.try_recv().is_err(), "No self-notification");
}

#[tokio::test]
async fn test_comment_carries_text_to_author() {
    let (hub, dispatcher) = dispatcher();
    let (conn_b, _rx_b) = connect(&hub, 2);
    let (_conn_a, mut rx_a) = connect(&hub, 1);

    dispatcher
        .handle_client_message(
            conn_b,
            2,
            ClientMessage::PostCommented {
                post_id: 99,
                author_id: 1,
                comment: "nice work".to_string(),
            },
        )
        .await
        .unwrap();

    match rx_a.try_recv().unwrap() {
        ServerEvent::PostInteraction { comment, .. } => {
            assert_eq!(comment.as_deref(), Some("nice work"));
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_celebrations_reach_every_tab_of_acting_user() {
    let (hub, dispatcher) = dispatcher();
    let (_tab1, mut rx1) = connect(&hub, 5);
    let (_tab2, mut rx2) = connect(&hub, 5);
    let (_other, mut rx_other) = connect(&hub, 6);

    dispatcher.celebrate_completion(
        5,
        CelebrationPayload {
            challenge_id: "daily-walk".to_string(),
            xp_awarded: 50,
            coins_awarded: 5,
            streak_count: 2,
            badge_unlocked: None,
        },
    );

    for rx in [&mut rx1, &mut rx2] {
        match rx.try_recv().expect("Both tabs celebrate") {
            ServerEvent::ChallengeCelebration { user_id, payload } => {
                assert_eq!(user_id, 5);
                assert_eq!(payload.xp_awarded, 50);
                assert_eq!(payload.streak_count, 2);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }
    assert!(rx_other.try_recv().is_err(), "Scoped to the acting user");
}

#[tokio::test]
async fn test_streak_milestone_event_shape() {
    let (hub, dispatcher) = dispatcher();
    let (_conn, mut rx) = connect(&hub, 5);

    dispatcher.celebrate_streak_milestone(5, 7, "streak-7".to_string());

    match rx.try_recv().unwrap() {
        ServerEvent::StreakMilestone {
            streak_count,
            badge_id,
            ..
        } => {
            assert_eq!(streak_count, 7);
            assert_eq!(badge_id, "streak-7");
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_silences_user_and_chat_rooms() {
    let (hub, dispatcher) = dispatcher();
    let (conn, mut rx) = connect(&hub, 42);
    hub.join(conn, RoomId::Chat(7));

    hub.unregister(conn);

    // Dispatches to either room no longer reach the connection.
    dispatcher.post_interaction(
        1,
        42,
        questline::realtime::events::InteractionKind::Like,
        5,
        None,
    );
    hub.send_to_room(
        RoomId::Chat(7),
        &ServerEvent::UserTyping {
            conversation_id: 7,
            user_id: 1,
        },
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_goal_progress_broadcast_syncs_own_tabs() {
    let (hub, dispatcher) = dispatcher();
    let (conn, mut rx1) = connect(&hub, 5);
    let (_tab2, mut rx2) = connect(&hub, 5);

    dispatcher
        .handle_client_message(
            conn,
            5,
            ClientMessage::GoalProgressBroadcast {
                payload: serde_json::json!({"goal_id": 3, "percent": 80}),
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        rx1.try_recv().unwrap(),
        ServerEvent::GoalProgress { user_id: 5, .. }
    ));
    assert!(matches!(
        rx2.try_recv().unwrap(),
        ServerEvent::GoalProgress { user_id: 5, .. }
    ));
}
