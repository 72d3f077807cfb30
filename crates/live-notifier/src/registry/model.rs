//! Registry data model and the durable snapshot shape.

use common::types::{DestinationId, RoomId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u64 = 1;

/// Metadata for a monitored room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Streamer or room display name.
    #[serde(default)]
    pub name: String,
    /// Who added the room.
    #[serde(default)]
    pub added_by: String,
    /// When the room was added, as written by the command that added it.
    #[serde(default)]
    pub added_time: String,
}

/// Per-(room, destination) delivery rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Mass-mention on live-start.
    #[serde(default)]
    pub at_all: bool,
    /// Forward gift notifications.
    #[serde(default)]
    pub gift_notify: bool,
    /// Only forward high-value gifts.
    #[serde(default = "default_high_value_only")]
    pub high_value_only: bool,
}

fn default_high_value_only() -> bool {
    true
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            at_all: false,
            gift_notify: false,
            high_value_only: true,
        }
    }
}

/// A mutable `SubscriptionConfig` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigField {
    AtAll,
    GiftNotify,
    HighValueOnly,
}

impl ConfigField {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigField::AtAll => "at_all",
            ConfigField::GiftNotify => "gift_notify",
            ConfigField::HighValueOnly => "high_value_only",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "at_all" => Ok(ConfigField::AtAll),
            "gift_notify" => Ok(ConfigField::GiftNotify),
            "high_value_only" => Ok(ConfigField::HighValueOnly),
            other => Err(format!("unknown config field '{other}'")),
        }
    }
}

impl SubscriptionConfig {
    #[must_use]
    pub fn get(&self, field: ConfigField) -> bool {
        match field {
            ConfigField::AtAll => self.at_all,
            ConfigField::GiftNotify => self.gift_notify,
            ConfigField::HighValueOnly => self.high_value_only,
        }
    }

    pub fn set(&mut self, field: ConfigField, value: bool) {
        match field {
            ConfigField::AtAll => self.at_all = value,
            ConfigField::GiftNotify => self.gift_notify = value,
            ConfigField::HighValueOnly => self.high_value_only = value,
        }
    }
}

/// Durable registry state. Serialized as the current schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u64,
    #[serde(default)]
    pub room_info: BTreeMap<RoomId, RoomInfo>,
    #[serde(default)]
    pub subscriptions: BTreeMap<RoomId, BTreeMap<DestinationId, SubscriptionConfig>>,
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            room_info: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
        }
    }
}

impl RegistrySnapshot {
    /// Total (room, destination) pairs.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(BTreeMap::len).sum()
    }
}
