//! Common error types for the live notifier components.

use thiserror::Error;

/// Errors raised while constructing shared identifiers and settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Room id is not a non-negative integer
    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    /// Destination id is blank
    #[error("Destination id must not be empty")]
    EmptyDestination,

    /// Log level is not one of trace/debug/info/warn/error
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Result type alias using `CommonError`
pub type Result<T> = std::result::Result<T, CommonError>;
