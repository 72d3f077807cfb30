//! Message types for actor communication.
//!
//! Requests that expect an answer carry a `oneshot` reply channel.

use crate::clients::RawEvent;
use crate::errors::NotifierError;
use crate::lifecycle::LifecycleState;
use chrono::{DateTime, Utc};
use common::types::RoomId;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `ConnectionSupervisor`.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Start monitoring a room. Replies `true` if the room was not watched before.
    Watch {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<bool, NotifierError>>,
    },

    /// Stop monitoring a room. Replies `true` if the room was watched.
    Unwatch {
        room_id: RoomId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Force a fresh connection for one room, or every room when `None`.
    /// Replies with the number of links restarted.
    Restart {
        room_id: Option<RoomId>,
        respond_to: oneshot::Sender<Result<usize, NotifierError>>,
    },

    /// Get per-room lifecycle and link status.
    GetStatus {
        respond_to: oneshot::Sender<SupervisorStatus>,
    },

    /// Stop accepting watches and cancel every room and link.
    Shutdown {
        respond_to: oneshot::Sender<Result<(), NotifierError>>,
    },
}

/// Messages sent to `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// A routed raw event for this room.
    Event(RawEvent),

    /// The room's link went down; freeze the lifecycle.
    LinkDown,

    /// The room's link is open again; resume the lifecycle.
    LinkUp,

    /// Get the room's runtime state.
    GetState {
        respond_to: oneshot::Sender<RoomSnapshot>,
    },
}

/// Reports from link workers to the supervisor, on a channel shared by all rooms.
#[derive(Debug)]
pub enum LinkReport {
    /// The worker for `room_id` has an open link.
    Connected { room_id: RoomId, generation: u64 },
    /// The link went down; the worker will reconnect after the delay.
    Down {
        room_id: RoomId,
        generation: u64,
        reason: String,
    },
    /// An event read from a link, in arrival order.
    Event { generation: u64, event: RawEvent },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Runtime state of one room, as reported by its actor.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub state: LifecycleState,
    /// Wall-clock start of the current session.
    pub live_since: Option<DateTime<Utc>>,
    /// Time left before a pending live-end fires.
    #[serde(serialize_with = "serialize_secs")]
    pub cooldown_remaining: Option<Duration>,
    /// Lifecycle frozen while the link is down.
    pub frozen: bool,
}

/// Status of one watched room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room_id: RoomId,
    pub state: LifecycleState,
    pub live_since: Option<DateTime<Utc>>,
    /// Whether the room's link is currently open.
    pub connected: bool,
    /// Link failures since the room was watched.
    pub reconnects: u64,
}

/// Status of the `ConnectionSupervisor`.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    /// Watched rooms, ordered by room id.
    pub rooms: Vec<RoomStatus>,
    /// Whether the supervisor is shutting down.
    pub is_draining: bool,
    /// Current mailbox depth.
    pub mailbox_depth: usize,
}

impl SupervisorStatus {
    #[must_use]
    pub fn watching(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.rooms
            .iter()
            .filter(|r| r.state.is_in_session())
            .count()
    }

    #[must_use]
    pub fn room(&self, room_id: RoomId) -> Option<&RoomStatus> {
        self.rooms.iter().find(|r| r.room_id == room_id)
    }
}

#[allow(clippy::ref_option)]
fn serialize_secs<S: serde::Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&d.as_secs()),
        None => serializer.serialize_none(),
    }
}
