//! Debounced room lifecycle.
//!
//! `RoomLifecycle` holds the transition rules for one room and nothing else:
//! no timers, no channels. The room actor owns the cooldown timer and feeds
//! the current instant into every call, so the rules can be exercised
//! directly with synthetic instants.
//!
//! While the room's link is down the lifecycle is frozen: a pending cooldown
//! stops counting and resumes with the time it had left once the link is back.
//!
//! ```text
//! Unknown ──live──▶ Live ──offline──▶ CoolingDown ──deadline──▶ Offline
//!    │               ▲                    │                        │
//!    │               └──────live──────────┘                        │
//!    └──offline──▶ Offline ◀───────────────────────────────────────┘
//!                     └──live──▶ Live
//! ```

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle state of a watched room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No observation yet.
    Unknown,
    /// Streaming.
    Live,
    /// Offline observed, waiting for the cooldown to elapse.
    CoolingDown,
    /// Session finalized.
    Offline,
}

impl LifecycleState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unknown => "unknown",
            LifecycleState::Live => "live",
            LifecycleState::CoolingDown => "cooling_down",
            LifecycleState::Offline => "offline",
        }
    }

    /// Live or in cooldown (the session has not ended yet).
    #[must_use]
    pub const fn is_in_session(&self) -> bool {
        matches!(self, LifecycleState::Live | LifecycleState::CoolingDown)
    }
}

/// Result of feeding a raw `live` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    /// A new session started; announce it.
    Started,
    /// Already live; nothing to do.
    Ignored,
    /// Offline arrived within the cooldown; pending end cancelled.
    Resumed,
    /// The previous session's cooldown had already elapsed: it ended with
    /// `previous_duration`, and a new session started.
    Restarted { previous_duration: Duration },
}

/// Result of feeding a raw `offline` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineOutcome {
    /// Cooldown started; the end is announced at `until` unless cancelled.
    CoolingDown { until: Instant },
    /// Already cooling down or offline.
    Ignored,
    /// First observation was offline; nothing was announced so nothing ends.
    MarkedOffline,
}

/// Result of a cooldown timer firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// Session finalized; announce the end.
    Ended { duration: Duration },
    /// The deadline moved or has not been reached.
    NotDue,
    /// Not cooling down (cancelled by a live event).
    Ignored,
}

/// Transition rules and runtime state for one room.
#[derive(Debug, Clone)]
pub struct RoomLifecycle {
    state: LifecycleState,
    cooldown: Duration,
    live_since: Option<Instant>,
    cooldown_until: Option<Instant>,
    last_transition: Option<Instant>,
    /// Set while the link is down.
    frozen: bool,
    /// Cooldown left when the lifecycle was frozen.
    frozen_remaining: Option<Duration>,
}

impl RoomLifecycle {
    /// Create a lifecycle in the `Unknown` state.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: LifecycleState::Unknown,
            cooldown,
            live_since: None,
            cooldown_until: None,
            last_transition: None,
            frozen: false,
            frozen_remaining: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Start of the current session, if any.
    #[must_use]
    pub fn live_since(&self) -> Option<Instant> {
        self.live_since
    }

    /// Deadline of the pending end. Only set while cooling down and not frozen.
    #[must_use]
    pub fn cooldown_deadline(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// Time left before the pending end fires, frozen or not.
    #[must_use]
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.frozen_remaining
            .or_else(|| self.cooldown_until.map(|until| until.saturating_duration_since(now)))
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Stop the cooldown clock. Repeated calls keep the first freeze.
    pub fn freeze(&mut self, now: Instant) {
        if self.frozen {
            return;
        }
        self.frozen = true;
        if let Some(until) = self.cooldown_until.take() {
            self.frozen_remaining = Some(until.saturating_duration_since(now));
        }
    }

    /// Restart the cooldown clock with the time it had left when frozen.
    ///
    /// Returns the new deadline, if a cooldown is pending.
    pub fn thaw(&mut self, now: Instant) -> Option<Instant> {
        if !self.frozen {
            return self.cooldown_until;
        }
        self.frozen = false;
        if let Some(remaining) = self.frozen_remaining.take() {
            if self.state == LifecycleState::CoolingDown {
                self.cooldown_until = Some(now + remaining);
            }
        }
        self.cooldown_until
    }

    #[must_use]
    pub fn last_transition(&self) -> Option<Instant> {
        self.last_transition
    }

    /// Apply a raw `live` event observed at `now`.
    pub fn on_live(&mut self, now: Instant) -> LiveOutcome {
        match self.state {
            LifecycleState::Unknown | LifecycleState::Offline => {
                self.start_session(now);
                LiveOutcome::Started
            }
            LifecycleState::Live => LiveOutcome::Ignored,
            LifecycleState::CoolingDown => match self.on_cooldown_elapsed(now) {
                ExpiryOutcome::Ended { duration } => {
                    self.start_session(now);
                    LiveOutcome::Restarted {
                        previous_duration: duration,
                    }
                }
                ExpiryOutcome::NotDue | ExpiryOutcome::Ignored => {
                    self.state = LifecycleState::Live;
                    self.cooldown_until = None;
                    self.frozen_remaining = None;
                    self.last_transition = Some(now);
                    LiveOutcome::Resumed
                }
            },
        }
    }

    /// Apply a raw `offline` event observed at `now`.
    pub fn on_offline(&mut self, now: Instant) -> OfflineOutcome {
        match self.state {
            LifecycleState::Live => {
                let until = now + self.cooldown;
                self.state = LifecycleState::CoolingDown;
                if self.frozen {
                    self.frozen_remaining = Some(self.cooldown);
                } else {
                    self.cooldown_until = Some(until);
                }
                self.last_transition = Some(now);
                OfflineOutcome::CoolingDown { until }
            }
            LifecycleState::Unknown => {
                self.state = LifecycleState::Offline;
                self.last_transition = Some(now);
                OfflineOutcome::MarkedOffline
            }
            LifecycleState::CoolingDown | LifecycleState::Offline => OfflineOutcome::Ignored,
        }
    }

    /// Finalize the session if the cooldown deadline has passed.
    pub fn on_cooldown_elapsed(&mut self, now: Instant) -> ExpiryOutcome {
        if self.state != LifecycleState::CoolingDown {
            return ExpiryOutcome::Ignored;
        }
        let Some(until) = self.cooldown_until else {
            return ExpiryOutcome::Ignored;
        };
        if now < until {
            return ExpiryOutcome::NotDue;
        }

        let duration = self
            .live_since
            .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));

        self.state = LifecycleState::Offline;
        self.cooldown_until = None;
        self.live_since = None;
        self.last_transition = Some(now);

        ExpiryOutcome::Ended { duration }
    }

    fn start_session(&mut self, now: Instant) {
        self.state = LifecycleState::Live;
        self.live_since = Some(now);
        self.cooldown_until = None;
        self.frozen_remaining = None;
        self.last_transition = Some(now);
    }
}
