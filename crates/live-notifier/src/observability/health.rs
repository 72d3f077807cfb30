//! Health endpoints for the live notifier.
//!
//! - `GET /health` answers 200 while the process can serve HTTP at all.
//! - `GET /ready` answers 200 once every [`StartupStep`] has completed and
//!   shutdown has not begun. Otherwise it answers 503 with a plain-text body
//!   naming what is missing, e.g. `waiting for: rooms-watched`.
//!
//! The `/metrics` endpoint is mounted next to these by [`crate::http`].

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Startup milestones that gate readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStep {
    /// The subscription registry was loaded (or started empty).
    RegistryLoaded,
    /// Every stored room has a room actor and a link.
    RoomsWatched,
    /// The command endpoint is accepting connections.
    ListenerBound,
}

impl StartupStep {
    const ALL: [StartupStep; 3] = [
        StartupStep::RegistryLoaded,
        StartupStep::RoomsWatched,
        StartupStep::ListenerBound,
    ];

    fn bit(self) -> u8 {
        match self {
            StartupStep::RegistryLoaded => 1,
            StartupStep::RoomsWatched => 1 << 1,
            StartupStep::ListenerBound => 1 << 2,
        }
    }
}

impl fmt::Display for StartupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StartupStep::RegistryLoaded => "registry-loaded",
            StartupStep::RoomsWatched => "rooms-watched",
            StartupStep::ListenerBound => "listener-bound",
        })
    }
}

/// Readiness of the notifier process.
#[derive(Debug, Default)]
pub struct HealthState {
    completed: AtomicU8,
    shutting_down: AtomicBool,
}

impl HealthState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&self, step: StartupStep) {
        self.completed.fetch_or(step.bit(), Ordering::SeqCst);
    }

    /// Readiness never returns once this is called.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Startup steps not yet completed, in startup order.
    #[must_use]
    pub fn pending(&self) -> Vec<StartupStep> {
        let completed = self.completed.load(Ordering::SeqCst);
        StartupStep::ALL
            .into_iter()
            .filter(|step| completed & step.bit() == 0)
            .collect()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.is_shutting_down() && self.pending().is_empty()
    }
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> (StatusCode, String) {
    if state.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down".to_string());
    }

    let pending = state.pending();
    if pending.is_empty() {
        return (StatusCode::OK, "ready".to_string());
    }

    let names: Vec<String> = pending.iter().map(ToString::to_string).collect();
    (
        StatusCode::SERVICE_UNAVAILABLE,
        format!("waiting for: {}", names.join(", ")),
    )
}
