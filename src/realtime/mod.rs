// SPDX-License-Identifier: MIT

//! Real-time layer: connection hub, room fan-out, and event dispatch.

pub mod dispatcher;
pub mod events;
pub mod hub;

pub use dispatcher::EventDispatcher;
pub use events::{ClientMessage, RoomId, ServerEvent};
pub use hub::{ConnectionHub, ConnectionId};
