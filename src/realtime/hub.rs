// SPDX-License-Identifier: MIT

//! Connection hub: live connection registry and room membership.
//!
//! Each connection owns an unbounded outbound channel; fan-out pushes
//! onto those channels without awaiting, so one backlogged receiver
//! never stalls delivery to the rest of a room or the sending handler.
//!
//! The hub tracks membership only. Whether a caller may act on a chat
//! room is decided by the dispatcher's handlers against the persisted
//! conversation record, not by room membership.

use crate::realtime::events::{RoomId, ServerEvent};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Identifier of one live connection. Two tabs of the same user are
/// two distinct connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

struct ConnectionHandle {
    user_id: u64,
    tx: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<RoomId>,
}

#[derive(Default)]
pub struct ConnectionHub {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, ConnectionHandle>,
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection and auto-join its user room.
    pub fn register(
        &self,
        user_id: u64,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnectionId {
        let conn_id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.insert(
            conn_id,
            ConnectionHandle {
                user_id,
                tx,
                rooms: HashSet::new(),
            },
        );
        self.join(conn_id, RoomId::User(user_id));
        tracing::debug!(user_id, conn = conn_id.0, "Connection registered");
        conn_id
    }

    /// Remove a connection from every room it joined and drop its
    /// sender. Subsequent dispatches to those rooms no longer reach it.
    pub fn unregister(&self, conn_id: ConnectionId) {
        let Some((_, handle)) = self.connections.remove(&conn_id) else {
            return;
        };
        for room in &handle.rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(&conn_id);
                if members.is_empty() {
                    drop(members);
                    self.rooms.remove_if(room, |_, m| m.is_empty());
                }
            }
        }
        tracing::debug!(user_id = handle.user_id, conn = conn_id.0, "Connection unregistered");
    }

    /// Join a room. Requires the connection to be registered.
    pub fn join(&self, conn_id: ConnectionId, room: RoomId) -> bool {
        let Some(mut handle) = self.connections.get_mut(&conn_id) else {
            return false;
        };
        handle.rooms.insert(room);
        drop(handle);
        self.rooms.entry(room).or_default().insert(conn_id);
        true
    }

    /// Leave a room.
    pub fn leave(&self, conn_id: ConnectionId, room: RoomId) {
        if let Some(mut handle) = self.connections.get_mut(&conn_id) {
            handle.rooms.remove(&room);
        }
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(&conn_id);
            if members.is_empty() {
                drop(members);
                self.rooms.remove_if(&room, |_, m| m.is_empty());
            }
        }
    }

    /// Deliver `event` once to every current member of `room`.
    /// An empty room is a silent no-op.
    pub fn send_to_room(&self, room: RoomId, event: &ServerEvent) {
        self.send_to_room_inner(room, None, event);
    }

    /// Deliver `event` to every member of `room` except `except`
    /// (typing indicators do not echo to their sender).
    pub fn send_to_room_except(
        &self,
        room: RoomId,
        except: ConnectionId,
        event: &ServerEvent,
    ) {
        self.send_to_room_inner(room, Some(except), event);
    }

    fn send_to_room_inner(
        &self,
        room: RoomId,
        except: Option<ConnectionId>,
        event: &ServerEvent,
    ) {
        // Snapshot membership before sending so no map guard is held
        // while pushing onto channels.
        let members: Vec<ConnectionId> = match self.rooms.get(&room) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };

        for member in members {
            if Some(member) == except {
                continue;
            }
            if let Some(handle) = self.connections.get(&member) {
                // A closed receiver just means the connection is going
                // away; unregister will clean it up.
                let _ = handle.tx.send(event.clone());
            }
        }
    }

    /// User bound to a connection at handshake, if still registered.
    pub fn user_of(&self, conn_id: ConnectionId) -> Option<u64> {
        self.connections.get(&conn_id).map(|h| h.user_id)
    }

    /// Number of live members in a room.
    pub fn room_size(&self, room: RoomId) -> usize {
        self.rooms.get(&room).map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::UnboundedSender<ServerEvent>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    fn reminder() -> ServerEvent {
        ServerEvent::DailyReminder {
            message: "don't lose your streak".to_string(),
        }
    }

    #[test]
    fn test_register_auto_joins_user_room() {
        let hub = ConnectionHub::new();
        let (tx, mut rx) = channel();
        hub.register(42, tx);

        hub.send_to_room(RoomId::User(42), &reminder());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_unregister_removes_from_all_rooms() {
        let hub = ConnectionHub::new();
        let (tx, mut rx) = channel();
        let conn = hub.register(42, tx);
        hub.join(conn, RoomId::Chat(7));

        hub.unregister(conn);

        hub.send_to_room(RoomId::User(42), &reminder());
        hub.send_to_room(RoomId::Chat(7), &reminder());
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.room_size(RoomId::User(42)), 0);
        assert_eq!(hub.room_size(RoomId::Chat(7)), 0);
    }

    #[test]
    fn test_empty_room_dispatch_is_noop() {
        let hub = ConnectionHub::new();
        // No members; must not panic or error.
        hub.send_to_room(RoomId::Chat(999), &reminder());
    }

    #[test]
    fn test_send_except_skips_sender() {
        let hub = ConnectionHub::new();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let conn_a = hub.register(1, tx_a);
        let conn_b = hub.register(2, tx_b);
        hub.join(conn_a, RoomId::Chat(7));
        hub.join(conn_b, RoomId::Chat(7));

        hub.send_to_room_except(
            RoomId::Chat(7),
            conn_a,
            &ServerEvent::UserTyping {
                conversation_id: 7,
                user_id: 1,
            },
        );

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_two_tabs_both_receive() {
        let hub = ConnectionHub::new();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        hub.register(42, tx_a);
        hub.register(42, tx_b);

        hub.send_to_room(RoomId::User(42), &reminder());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_join_requires_registration() {
        let hub = ConnectionHub::new();
        assert!(!hub.join(ConnectionId(999), RoomId::Chat(1)));
        assert_eq!(hub.room_size(RoomId::Chat(1)), 0);
    }

    #[test]
    fn test_leave_room() {
        let hub = ConnectionHub::new();
        let (tx, mut rx) = channel();
        let conn = hub.register(1, tx);
        hub.join(conn, RoomId::Chat(5));
        hub.leave(conn, RoomId::Chat(5));

        hub.send_to_room(RoomId::Chat(5), &reminder());
        assert!(rx.try_recv().is_err());
        // Still in own user room.
        hub.send_to_room(RoomId::User(1), &reminder());
        assert!(rx.try_recv().is_ok());
    }
}
