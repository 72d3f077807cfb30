//! Test fixtures: registries in temporary directories and raw events.

use chrono::Utc;
use common::types::{DestinationId, RoomId};
use live_notifier::clients::RawEvent;
use live_notifier::notification::GiftEvent;
use live_notifier::persistence::PersistenceManager;
use live_notifier::registry::model::{RegistrySnapshot, RoomInfo, SubscriptionConfig};
use live_notifier::registry::SubscriptionRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Subscription rule presets.
pub struct TestConfig;

impl TestConfig {
    /// Defaults: no mass-mention, no gifts, high-value filter on.
    #[must_use]
    pub fn plain() -> SubscriptionConfig {
        SubscriptionConfig::default()
    }

    #[must_use]
    pub fn at_all() -> SubscriptionConfig {
        SubscriptionConfig {
            at_all: true,
            ..SubscriptionConfig::default()
        }
    }

    /// Gift notifications on, with or without the high-value filter.
    #[must_use]
    pub fn gifts(high_value_only: bool) -> SubscriptionConfig {
        SubscriptionConfig {
            gift_notify: true,
            high_value_only,
            ..SubscriptionConfig::default()
        }
    }
}

/// Builder for a registry stored in a temporary directory.
#[derive(Debug, Default)]
pub struct RegistryFixture {
    snapshot: RegistrySnapshot,
}

impl RegistryFixture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn room(mut self, room_id: u64, name: &str) -> Self {
        self.snapshot.room_info.insert(RoomId(room_id), room_info(name));
        self
    }

    #[must_use]
    pub fn subscribe(mut self, room_id: u64, destination: &str, config: SubscriptionConfig) -> Self {
        self.snapshot
            .subscriptions
            .entry(RoomId(room_id))
            .or_default()
            .insert(dest(destination), config);
        self
    }

    /// Write the snapshot to disk and open a registry over it.
    pub async fn build(self) -> TestRegistry {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live_notifier.json");
        let persistence = PersistenceManager::new(path.clone());
        persistence.save(&self.snapshot).unwrap();

        TestRegistry {
            registry: Arc::new(SubscriptionRegistry::open(persistence).await),
            path,
            _dir: dir,
        }
    }
}

/// A registry plus the temporary directory holding its file.
pub struct TestRegistry {
    pub registry: Arc<SubscriptionRegistry>,
    /// Durable state file.
    pub path: PathBuf,
    _dir: TempDir,
}

impl TestRegistry {
    /// Current on-disk contents as JSON.
    #[must_use]
    pub fn stored(&self) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(&self.path).unwrap()).unwrap()
    }

    /// Open a second registry over the same file, as after a restart.
    pub async fn reopen(&self) -> SubscriptionRegistry {
        SubscriptionRegistry::open(PersistenceManager::new(self.path.clone())).await
    }
}

#[must_use]
pub fn room_info(name: &str) -> RoomInfo {
    RoomInfo {
        name: name.to_string(),
        added_by: "admin".to_string(),
        added_time: "2024-01-01 12:00:00".to_string(),
    }
}

#[must_use]
pub fn dest(id: &str) -> DestinationId {
    DestinationId::new(id).unwrap()
}

#[must_use]
pub fn live(room_id: u64) -> RawEvent {
    RawEvent::Live {
        room_id: RoomId(room_id),
        observed_at: Utc::now(),
    }
}

#[must_use]
pub fn offline(room_id: u64) -> RawEvent {
    RawEvent::Offline {
        room_id: RoomId(room_id),
        observed_at: Utc::now(),
    }
}

#[must_use]
pub fn gift(room_id: u64, gift_id: &str, count: u32) -> RawEvent {
    RawEvent::Gift {
        room_id: RoomId(room_id),
        gift: GiftEvent {
            gift_id: gift_id.to_string(),
            sender: "viewer".to_string(),
            count,
            timestamp: Utc::now(),
        },
    }
}
