//! Live Notifier Library
//!
//! Watches broadcast rooms and tells subscribed destinations when a room goes
//! live, when a session ends, and when a high-value gift arrives.
//!
//! # Architecture
//!
//! ```text
//! ConnectionSupervisor (singleton)
//! ├── RoomActor (one per watched room, debounces live/offline)
//! └── LinkWorker (one per watched room, reconnects on failure)
//!         │
//!         ▼ Notification
//! DispatchQueue ── NotificationDispatcher ── MessageSender
//!         ▲
//! SubscriptionRegistry ── PersistenceManager (atomic JSON file)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Cooldown debounce**: an offline signal only ends a session once the
//!   cooldown elapses without a new live signal
//! - **Link failures are not lifecycle events**: a dropped link reconnects
//!   without touching room state
//! - **Degraded retries**: a failed mass-mention send is retried without the
//!   mention marker
//! - **Dirty-tracked persistence**: every registry mutation is saved; failed
//!   saves keep the change counter until a later save succeeds
//!
//! # Modules
//!
//! - [`actors`] - Supervisor, room actors, link workers
//! - [`dispatch`] - Per-room ordered, retrying notification delivery
//! - [`registry`] - Rooms, subscriptions and per-subscription rules
//! - [`persistence`] - Atomic snapshot storage and schema migration
//! - [`commands`] - Command execution
//! - [`clients`] - Stream, room API and webhook adapters
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with HTTP status mapping

pub mod actors;
pub mod clients;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod gifts;
pub mod http;
pub mod lifecycle;
pub mod notification;
pub mod observability;
pub mod persistence;
pub mod registry;
pub mod render;
