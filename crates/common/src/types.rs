//! Common data types for the live notifier components.

use crate::error::CommonError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable numeric identifier of a broadcast room.
///
/// Serialized transparently, so it can be used as a JSON object key
/// (`"12725169": {...}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl RoomId {
    /// Get the raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(RoomId)
            .map_err(|_| CommonError::InvalidRoomId(s.to_string()))
    }
}

impl From<u64> for RoomId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Opaque identifier of a delivery target (chat group, user, or session).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(String);

impl DestinationId {
    /// Create a destination id.
    ///
    /// # Errors
    ///
    /// Returns `CommonError::EmptyDestination` if the id is blank.
    pub fn new(id: impl Into<String>) -> Result<Self, CommonError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CommonError::EmptyDestination);
        }
        Ok(Self(id))
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
