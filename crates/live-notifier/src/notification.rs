//! Outbound notification intents produced by room actors.

use chrono::{DateTime, Utc};
use common::types::RoomId;
use std::time::Duration;

/// A single gift observation from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftEvent {
    /// Gift identifier from the stream protocol.
    pub gift_id: String,
    /// Display name of the sender.
    pub sender: String,
    /// Number of gifts in this batch (at least 1).
    pub count: u32,
    /// When the gift was observed.
    pub timestamp: DateTime<Utc>,
}

/// What happened in the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// A new live session started.
    LiveStart { started_at: DateTime<Utc> },
    /// The live session ended after the cooldown elapsed.
    LiveEnd {
        duration: Duration,
        ended_at: DateTime<Utc>,
    },
    /// A gift was received.
    Gift(GiftEvent),
}

impl NotificationKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LiveStart { .. } => "live_start",
            NotificationKind::LiveEnd { .. } => "live_end",
            NotificationKind::Gift(_) => "gift",
        }
    }
}

/// A notification tagged with the room that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub room_id: RoomId,
    pub kind: NotificationKind,
}

impl Notification {
    #[must_use]
    pub fn live_start(room_id: RoomId, started_at: DateTime<Utc>) -> Self {
        Self {
            room_id,
            kind: NotificationKind::LiveStart { started_at },
        }
    }

    #[must_use]
    pub fn live_end(room_id: RoomId, duration: Duration, ended_at: DateTime<Utc>) -> Self {
        Self {
            room_id,
            kind: NotificationKind::LiveEnd { duration, ended_at },
        }
    }

    #[must_use]
    pub fn gift(room_id: RoomId, gift: GiftEvent) -> Self {
        Self {
            room_id,
            kind: NotificationKind::Gift(gift),
        }
    }
}
