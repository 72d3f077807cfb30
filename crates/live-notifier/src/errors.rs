//! Live notifier error types.
//!
//! `NotifierError` is what command callers see. Narrower errors (`StreamError`,
//! `SendError`, `ResolveError`, `GiftConfigError`, `PersistenceError`,
//! `MigrationError`) stay inside the component that produces them and are
//! logged there; only the ones a caller can act on are converted.

use common::types::RoomId;
use std::path::PathBuf;
use thiserror::Error;

/// Live notifier error type.
///
/// Maps to HTTP status codes on the command endpoint:
/// - `RoomNotFound`, `RoomNotWatched`: 404
/// - `Conflict`, `AlreadySubscribed`, `NotSubscribed`: 409
/// - `Draining`: 503
/// - `InvalidRequest`: 400
/// - `Config`, `Internal`: 500
#[derive(Debug, Error)]
pub enum NotifierError {
    /// Room is not registered.
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// Room is registered but the supervisor is not watching it.
    #[error("Room not watched: {0}")]
    RoomNotWatched(RoomId),

    /// Conflict error (e.g., room already registered).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Destination already subscribed to the room.
    #[error("Already subscribed to room {0}")]
    AlreadySubscribed(RoomId),

    /// Destination has no subscription for the room.
    #[error("Not subscribed to room {0}")]
    NotSubscribed(RoomId),

    /// Shutdown in progress.
    #[error("Notifier is shutting down")]
    Draining,

    /// Malformed request from the command router.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (actor channel failures and similar).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NotifierError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            NotifierError::RoomNotFound(_) | NotifierError::RoomNotWatched(_) => 404,
            NotifierError::Conflict(_)
            | NotifierError::AlreadySubscribed(_)
            | NotifierError::NotSubscribed(_) => 409,
            NotifierError::Draining => 503,
            NotifierError::InvalidRequest(_) => 400,
            NotifierError::Config(_) | NotifierError::Internal(_) => 500,
        }
    }

    /// Returns a caller-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            NotifierError::RoomNotFound(room_id) => {
                format!("Room {room_id} is not in the monitoring list")
            }
            NotifierError::RoomNotWatched(room_id) => {
                format!("Room {room_id} is not being monitored")
            }
            NotifierError::AlreadySubscribed(room_id) => {
                format!("Already subscribed to room {room_id}")
            }
            NotifierError::NotSubscribed(room_id) => {
                format!("Not subscribed to room {room_id}; subscribe first")
            }
            NotifierError::Draining => "Notifier is shutting down, try again later".to_string(),
            NotifierError::Conflict(msg) | NotifierError::InvalidRequest(msg) => msg.clone(),
            NotifierError::Config(_) | NotifierError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

/// Stream Protocol Client failures. Never surfaced to command callers; the
/// link worker logs them and schedules a reconnect.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Could not establish the link.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Status check failed.
    #[error("status check failed: {0}")]
    StatusCheck(String),
}

/// Sender failures. Retried by the dispatcher, never surfaced.
#[derive(Debug, Error)]
pub enum SendError {
    /// Destination or sender endpoint unreachable.
    #[error("destination unreachable: {0}")]
    Unreachable(String),

    /// Sender endpoint rejected the message.
    #[error("rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

/// Name Resolver failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The room does not exist upstream.
    #[error("room not found upstream")]
    NotFound,

    /// Lookup failed for another reason.
    #[error("room lookup unavailable: {0}")]
    Unavailable(String),
}

/// Gift config refresh failures. The previous names stay in use.
#[derive(Debug, Error)]
pub enum GiftConfigError {
    /// Transport failure or non-success status.
    #[error("gift config unavailable: {0}")]
    Unavailable(String),

    /// The payload is not the expected JSON, with or without a JSONP wrapper.
    #[error("gift config malformed: {0}")]
    Malformed(String),

    /// The payload parsed but named no gifts.
    #[error("gift config contains no gifts")]
    Empty,
}

/// Durable storage write failures. Load failures never escape the
/// persistence manager (they fall back to an empty snapshot).
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be encoded.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Schema migration failures that make a stored blob unusable as a whole.
/// Unrecognized fragments inside a usable blob are logged, not returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    /// Top-level value is not a JSON object.
    #[error("stored state is not a JSON object")]
    NotAnObject,

    /// Stored schema is newer than this build understands.
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u64),
}
