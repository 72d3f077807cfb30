//! Registry and persistence tests against real files.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::RoomId;
use live_notifier::errors::NotifierError;
use live_notifier::persistence::PersistenceManager;
use live_notifier::registry::model::{ConfigField, SubscriptionConfig};
use live_notifier::registry::SubscriptionRegistry;
use notifier_test_utils::*;
use serde_json::json;

#[tokio::test]
async fn test_legacy_state_is_migrated_and_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live_notifier.json");
    let legacy = json!({
        "room_info": {
            "12725169": {
                "name": "Streamer",
                "added_by": "10001",
                "added_time": "2024-05-01 20:00:00",
                "at_all": true,
                "gift_notify": true,
                "min_gift_price": 100
            },
            "288016": {"name": "Quiet Room", "added_by": "10001", "added_time": "2024-05-02 09:30:00"}
        },
        "subscriptions": {
            "12725169": ["group-a", "group-b"],
            "288016": ["group-a"]
        }
    });
    std::fs::write(&path, legacy.to_string()).unwrap();

    let registry = SubscriptionRegistry::open(PersistenceManager::new(path.clone())).await;

    let loud = registry.destinations_for(RoomId(12_725_169)).await;
    assert_eq!(loud.len(), 2);
    for (_, config) in &loud {
        assert_eq!(
            *config,
            SubscriptionConfig {
                at_all: true,
                gift_notify: true,
                high_value_only: true,
            }
        );
    }

    let quiet = registry.destinations_for(RoomId(288_016)).await;
    assert_eq!(
        quiet.first().unwrap().1,
        SubscriptionConfig {
            at_all: false,
            gift_notify: false,
            high_value_only: false,
        }
    );
    assert_eq!(
        registry.room(RoomId(288_016)).await.unwrap().added_time,
        "2024-05-02 09:30:00"
    );

    // Migrated state is saved back in the current schema
    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored["version"], 1);
    assert_eq!(
        stored["subscriptions"]["12725169"]["group-b"]["at_all"],
        true
    );
}

#[tokio::test]
async fn test_mutations_survive_restart() {
    let fixture = RegistryFixture::new()
        .room(1, "One")
        .room(2, "Two")
        .subscribe(1, "group-a", TestConfig::plain())
        .build()
        .await;
    let registry = &fixture.registry;

    assert!(registry.subscribe(RoomId(2), dest("group-b")).await.unwrap());
    registry
        .set_config(RoomId(1), &dest("group-a"), ConfigField::GiftNotify, true)
        .await
        .unwrap();
    registry
        .toggle_config(RoomId(2), &dest("group-b"), ConfigField::AtAll, None)
        .await
        .unwrap();
    registry.remove_room(RoomId(1)).await.unwrap();
    assert_eq!(registry.unsaved_changes(), 0);

    let reopened = fixture.reopen().await;
    assert_eq!(reopened.snapshot().await, registry.snapshot().await);
    assert!(reopened.room(RoomId(1)).await.is_none());
    assert!(reopened.destinations_for(RoomId(1)).await.is_empty());
    assert_eq!(
        reopened.subscriptions_of(&dest("group-b")).await,
        vec![(RoomId(2), TestConfig::at_all())]
    );
}

#[tokio::test]
async fn test_config_change_on_unsubscribed_pair_is_rejected() {
    let fixture = RegistryFixture::new()
        .room(1, "One")
        .subscribe(1, "group-a", TestConfig::plain())
        .build()
        .await;
    let before = fixture.stored();

    let result = fixture
        .registry
        .set_config(RoomId(1), &dest("group-z"), ConfigField::AtAll, true)
        .await;
    assert!(matches!(result, Err(NotifierError::NotSubscribed(RoomId(1)))));

    let result = fixture
        .registry
        .toggle_config(RoomId(1), &dest("group-z"), ConfigField::GiftNotify, None)
        .await;
    assert!(matches!(result, Err(NotifierError::NotSubscribed(_))));

    assert_eq!(fixture.registry.subscriber_count(RoomId(1)).await, 1);
    assert_eq!(fixture.stored(), before, "nothing is written");
}

#[tokio::test]
async fn test_corrupt_state_starts_empty_and_keeps_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live_notifier.json");
    std::fs::write(&path, "{not json").unwrap();

    let registry = SubscriptionRegistry::open(PersistenceManager::new(path.clone())).await;
    assert!(registry.rooms().await.is_empty());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("live_notifier.json.corrupt")).unwrap(),
        "{not json"
    );

    // The registry is usable and saves a fresh file
    registry
        .add_room(RoomId(5), room_info("Five"))
        .await
        .unwrap();
    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored["room_info"]["5"]["name"], "Five");
}

#[tokio::test]
async fn test_duplicate_room_and_subscription() {
    let fixture = RegistryFixture::new().room(1, "One").build().await;
    let registry = &fixture.registry;

    assert!(matches!(
        registry.add_room(RoomId(1), room_info("Again")).await,
        Err(NotifierError::Conflict(_))
    ));
    assert!(matches!(
        registry.subscribe(RoomId(9), dest("group-a")).await,
        Err(NotifierError::RoomNotFound(RoomId(9)))
    ));

    assert!(registry.subscribe(RoomId(1), dest("group-a")).await.unwrap());
    assert!(!registry.subscribe(RoomId(1), dest("group-a")).await.unwrap());
    assert_eq!(registry.total_subscriptions().await, 1);
}

#[tokio::test]
async fn test_partially_bad_state_keeps_good_rooms() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live_notifier.json");
    let legacy = json!({
        "room_info": {
            " 1": {"name": "Padded", "added_by": "10001", "added_time": "2024-05-01 20:00:00"},
            "2": {"name": "Streamer", "added_by": "10001", "added_time": "2024-05-02 09:30:00",
                  "at_all": true},
            "not-a-room": {"name": "Broken"}
        },
        "subscriptions": {
            " 1": ["g"],
            "2": ["g", ""],
            "3": {"g": {"at_all": "sometimes"}}
        }
    });
    std::fs::write(&path, legacy.to_string()).unwrap();

    let registry = SubscriptionRegistry::open(PersistenceManager::new(path.clone())).await;

    assert!(!dir.path().join("live_notifier.json.corrupt").exists());
    assert_eq!(registry.rooms().await.len(), 2);
    assert_eq!(registry.room(RoomId(1)).await.unwrap().name, "Padded");
    assert_eq!(
        registry.destinations_for(RoomId(2)).await,
        vec![(dest("g"), TestConfig::at_all())]
    );
    assert_eq!(
        registry.destinations_for(RoomId(3)).await,
        vec![(dest("g"), TestConfig::plain())]
    );

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored["version"], 1);
    assert_eq!(stored["room_info"]["1"]["name"], "Padded");
    assert!(stored["room_info"].get(" 1").is_none());
}
