//! Actor metrics and mailbox monitoring.
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Supervisor | < 100  | 100-500 | > 500    |
//! | Room       | < 50   | 50-200  | > 200    |
//! | Dispatcher | < 100  | 100-500 | > 500    |

use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for the supervisor and dispatcher.
pub const SUPERVISOR_MAILBOX_NORMAL: usize = 100;
pub const SUPERVISOR_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for room actors.
pub const ROOM_MAILBOX_NORMAL: usize = 50;
pub const ROOM_MAILBOX_WARNING: usize = 200;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `ConnectionSupervisor` (singleton).
    Supervisor,
    /// `RoomActor` (one per watched room).
    Room,
    /// `NotificationDispatcher` queue (singleton).
    Dispatcher,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Supervisor => "supervisor",
            ActorType::Room => "room",
            ActorType::Dispatcher => "dispatcher",
        }
    }

    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Supervisor | ActorType::Dispatcher => SUPERVISOR_MAILBOX_WARNING,
            ActorType::Room => ROOM_MAILBOX_WARNING,
        }
    }

    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Supervisor | ActorType::Dispatcher => SUPERVISOR_MAILBOX_NORMAL,
            ActorType::Room => ROOM_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    /// Actor identifier (room id for room actors).
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message taken from the mailbox with `backlog` messages still
    /// queued behind it.
    pub fn record_receive(&self, backlog: usize) {
        let new_depth = backlog + 1;
        self.depth.store(new_depth, Ordering::Relaxed);
        let previous_peak = self.peak_depth.fetch_max(new_depth, Ordering::Relaxed);

        let level = self.level_for_depth(new_depth);
        if level == MailboxLevel::Critical {
            warn!(
                target: "notifier.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                threshold = self.actor_type.warning_threshold(),
                "Mailbox depth critical"
            );
        } else if level == MailboxLevel::Warning
            && self.level_for_depth(previous_peak) == MailboxLevel::Normal
        {
            debug!(
                target: "notifier.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                "Mailbox depth elevated"
            );
        }
        prom::set_actor_mailbox_depth(self.actor_type.as_str(), new_depth);
    }

    /// Record the message in hand as processed.
    pub fn record_processed(&self) {
        let new_depth = self.depth.load(Ordering::Relaxed).saturating_sub(1);
        self.depth.store(new_depth, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        prom::set_actor_mailbox_depth(self.actor_type.as_str(), new_depth);
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated metrics for the actor system, shared by every actor.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Rooms currently watched.
    pub watched_rooms: AtomicUsize,
    /// Links currently connected.
    pub connected_links: AtomicUsize,
    /// Total actor panics (indicates bugs).
    pub actor_panics: AtomicU64,
    /// Total messages processed across all actors.
    pub total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn room_watched(&self) {
        let count = self.watched_rooms.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_rooms_watched(count);
    }

    pub fn room_unwatched(&self) {
        let count = self
            .watched_rooms
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        prom::set_rooms_watched(count);
    }

    pub fn link_connected(&self) {
        self.connected_links.fetch_add(1, Ordering::Relaxed);
    }

    pub fn link_disconnected(&self) {
        self.connected_links.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        prom::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "notifier.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn watched_room_count(&self) -> usize {
        self.watched_rooms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connected_link_count(&self) -> usize {
        self.connected_links.load(Ordering::Relaxed)
    }
}
