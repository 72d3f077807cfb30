//! Collaborator boundaries.
//!
//! The core talks to the outside world only through these traits:
//! - [`StreamClient`] / [`StreamLink`]: room status and gift events
//! - [`MessageSender`]: delivery to destinations
//! - [`NameResolver`]: room display name lookup
//!
//! Production adapters live in the submodules; tests use scripted fakes.
//! [`GiftConfigClient`] is not a trait seam: it only refreshes gift names.

pub mod gateway;
pub mod gift_config;
pub mod room_api;
pub mod webhook;

use crate::errors::{ResolveError, SendError, StreamError};
use crate::notification::GiftEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{DestinationId, RoomId};

pub use gateway::GatewayStreamClient;
pub use gift_config::GiftConfigClient;
pub use room_api::RoomApiClient;
pub use webhook::WebhookSender;

/// A raw event from the stream protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// The room reports it is broadcasting.
    Live {
        room_id: RoomId,
        observed_at: DateTime<Utc>,
    },
    /// The room reports it stopped broadcasting.
    Offline {
        room_id: RoomId,
        observed_at: DateTime<Utc>,
    },
    /// A gift was sent in the room.
    Gift { room_id: RoomId, gift: GiftEvent },
    /// The link dropped.
    Disconnected { reason: String },
    /// The client received something it could not interpret.
    Malformed { detail: String },
}

impl RawEvent {
    /// Room the event belongs to, for routable events.
    #[must_use]
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            RawEvent::Live { room_id, .. }
            | RawEvent::Offline { room_id, .. }
            | RawEvent::Gift { room_id, .. } => Some(*room_id),
            RawEvent::Disconnected { .. } | RawEvent::Malformed { .. } => None,
        }
    }
}

/// An open link to the stream service for one room.
#[async_trait]
pub trait StreamLink: Send {
    /// Next event, or `None` once the link is closed.
    async fn next_event(&mut self) -> Option<RawEvent>;

    /// Close the link.
    async fn close(&mut self);
}

/// Stream Protocol Client.
#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Open a link for `room_id`.
    async fn connect(&self, room_id: RoomId) -> Result<Box<dyn StreamLink>, StreamError>;

    /// Whether the room is broadcasting right now.
    async fn check_live(&self, room_id: RoomId) -> Result<bool, StreamError>;
}

/// Outbound message delivery.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Deliver a rendered message; the sender adds the mass-mention marker
    /// itself when `wants_mass_mention` is set.
    async fn send(
        &self,
        destination: &DestinationId,
        message: &str,
        wants_mass_mention: bool,
    ) -> Result<(), SendError>;
}

/// Room display name lookup.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_name(&self, room_id: RoomId) -> Result<String, ResolveError>;
}
