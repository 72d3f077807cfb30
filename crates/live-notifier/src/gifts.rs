//! Gift classification.
//!
//! Tiers come from a static table. Display names come from the online gift
//! config when it has been fetched (see [`crate::clients::gift_config`]),
//! then from the static table, then a mystery-gift fallback.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// Gift value tier. Ordering follows value; `Unknown` sorts lowest and is
/// never treated as high-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GiftTier {
    Unknown,
    Common,
    Premium,
    Airplane,
    Rocket,
    SuperRocket,
}

impl GiftTier {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            GiftTier::Unknown => "unknown",
            GiftTier::Common => "common",
            GiftTier::Premium => "premium",
            GiftTier::Airplane => "airplane",
            GiftTier::Rocket => "rocket",
            GiftTier::SuperRocket => "super_rocket",
        }
    }
}

impl fmt::Display for GiftTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GiftTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "common" => Ok(GiftTier::Common),
            "premium" => Ok(GiftTier::Premium),
            "airplane" => Ok(GiftTier::Airplane),
            "rocket" => Ok(GiftTier::Rocket),
            "super_rocket" | "superrocket" => Ok(GiftTier::SuperRocket),
            other => Err(format!("unknown gift tier '{other}'")),
        }
    }
}

/// Known gifts: (id, display name, tier).
const GIFT_TABLE: &[(&str, &str, GiftTier)] = &[
    ("824", "Glow Stick", GiftTier::Common),
    ("192", "Like", GiftTier::Common),
    ("193", "Weak Chicken", GiftTier::Common),
    ("519", "Call 666", GiftTier::Common),
    ("520", "Heart", GiftTier::Common),
    ("750", "Fan Card", GiftTier::Premium),
    ("712", "Love Letter", GiftTier::Premium),
    ("1859", "Small Yacht", GiftTier::Premium),
    ("195", "Airplane", GiftTier::Airplane),
    ("1027", "Sports Car", GiftTier::Airplane),
    ("196", "Rocket", GiftTier::Rocket),
    ("1006", "Carnival", GiftTier::Rocket),
    ("1005", "Super Rocket", GiftTier::SuperRocket),
];

/// A classified gift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftInfo {
    pub name: String,
    pub tier: GiftTier,
}

/// Names fetched from the online gift config.
#[derive(Debug, Default)]
struct OnlineNames {
    names: HashMap<String, String>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Gift lookup with a configurable high-value threshold.
///
/// Clones share the online name overlay, so a refresh through one clone is
/// seen by every dispatcher holding another.
#[derive(Debug, Clone)]
pub struct GiftCatalog {
    threshold: GiftTier,
    online: Arc<RwLock<OnlineNames>>,
}

impl Default for GiftCatalog {
    fn default() -> Self {
        Self::new(GiftTier::Airplane)
    }
}

impl GiftCatalog {
    #[must_use]
    pub fn new(threshold: GiftTier) -> Self {
        Self {
            threshold,
            online: Arc::new(RwLock::new(OnlineNames::default())),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> GiftTier {
        self.threshold
    }

    /// Replace the online name overlay.
    pub fn replace_online_names(&self, names: HashMap<String, String>) {
        if let Ok(mut online) = self.online.write() {
            online.names = names;
            online.refreshed_at = Some(Utc::now());
        }
    }

    /// Number of names in the online overlay.
    #[must_use]
    pub fn online_name_count(&self) -> usize {
        self.online.read().map_or(0, |online| online.names.len())
    }

    /// When the online overlay was last replaced.
    #[must_use]
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.online.read().ok().and_then(|online| online.refreshed_at)
    }

    /// Look up a gift; unknown ids become a mystery gift with `Unknown` tier.
    #[must_use]
    pub fn classify(&self, gift_id: &str) -> GiftInfo {
        let known = GIFT_TABLE.iter().find(|(id, _, _)| *id == gift_id);
        let tier = known.map_or(GiftTier::Unknown, |(_, _, tier)| *tier);
        let name = self
            .online_name(gift_id)
            .or_else(|| known.map(|(_, name, _)| (*name).to_string()))
            .unwrap_or_else(|| format!("Mystery gift ({gift_id})"));
        GiftInfo { name, tier }
    }

    fn online_name(&self, gift_id: &str) -> Option<String> {
        self.online
            .read()
            .ok()
            .and_then(|online| online.names.get(gift_id).cloned())
    }

    #[must_use]
    pub fn is_high_value(&self, info: &GiftInfo) -> bool {
        info.tier != GiftTier::Unknown && info.tier >= self.threshold
    }
}
