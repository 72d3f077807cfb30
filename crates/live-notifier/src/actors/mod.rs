//! Actor hierarchy for room monitoring.
//!
//! ```text
//! ConnectionSupervisor (singleton)
//! └── per watched room
//!     ├── RoomActor   (owns the room's lifecycle and cooldown timer)
//!     └── LinkWorker  (owns the room's stream link, reconnects on failure)
//! ```
//!
//! Link workers push events into one channel read by the supervisor, which
//! forwards each event to its room's mailbox. Room actors publish
//! notifications to the dispatcher queue.
//!
//! # Modules
//!
//! - [`supervisor`] - `ConnectionSupervisor` singleton that owns rooms and links
//! - [`room`] - `RoomActor` per watched room
//! - [`link`] - `LinkWorker` per watched room
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod link;
pub mod messages;
pub mod metrics;
pub mod room;
pub mod supervisor;

pub use link::{LinkOutcome, LinkWorker};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use room::{RoomActor, RoomActorHandle};
pub use supervisor::{ConnectionSupervisor, ConnectionSupervisorHandle, SupervisorConfig};
