//! Subscription registry.
//!
//! Owns every `SubscriptionConfig` and all room metadata. Reads
//! (`destinations_for`, `room`, ...) share a read lock; every mutation takes
//! the write lock and keeps it until the snapshot has been handed to the
//! persistence manager, so a mutation and its save are never interleaved with
//! another mutation.
//!
//! A failed save does not fail the mutation: memory stays authoritative and
//! `unsaved_changes` counts mutations since the last successful save.

pub mod model;

use crate::errors::NotifierError;
use crate::observability::metrics;
use crate::persistence::PersistenceManager;
use common::types::{DestinationId, RoomId};
use model::{ConfigField, RegistrySnapshot, RoomInfo, SubscriptionConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// In-memory registry backed by durable storage.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    state: RwLock<RegistrySnapshot>,
    persistence: PersistenceManager,
    unsaved: AtomicU64,
}

impl SubscriptionRegistry {
    /// Load the registry from durable storage.
    ///
    /// A migrated snapshot is saved back immediately.
    pub async fn open(persistence: PersistenceManager) -> Self {
        let loader = persistence.clone();
        let outcome = match tokio::task::spawn_blocking(move || loader.load()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    target: "notifier.registry",
                    error = %e,
                    "Registry load task failed, starting empty"
                );
                crate::persistence::LoadOutcome {
                    snapshot: RegistrySnapshot::default(),
                    migrated: false,
                }
            }
        };

        let registry = Self::from_snapshot(outcome.snapshot, persistence);
        if outcome.migrated {
            info!(
                target: "notifier.registry",
                "Persisting migrated registry"
            );
            registry.flush().await;
        }
        registry
    }

    /// Build a registry around an existing snapshot without touching storage.
    #[must_use]
    pub fn from_snapshot(snapshot: RegistrySnapshot, persistence: PersistenceManager) -> Self {
        Self {
            state: RwLock::new(snapshot),
            persistence,
            unsaved: AtomicU64::new(0),
        }
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    /// Register a room.
    ///
    /// # Errors
    ///
    /// `Conflict` if the room is already registered.
    pub async fn add_room(&self, room_id: RoomId, info: RoomInfo) -> Result<(), NotifierError> {
        let mut state = self.state.write().await;
        if state.room_info.contains_key(&room_id) {
            return Err(NotifierError::Conflict(format!(
                "Room {room_id} is already monitored"
            )));
        }
        state.room_info.insert(room_id, info);
        self.persist(&state).await;

        info!(
            target: "notifier.registry",
            room_id = %room_id,
            rooms = state.room_info.len(),
            "Room added"
        );
        Ok(())
    }

    /// Remove a room and every subscription to it.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if the room is not registered.
    pub async fn remove_room(&self, room_id: RoomId) -> Result<RoomInfo, NotifierError> {
        let mut state = self.state.write().await;
        let info = state
            .room_info
            .remove(&room_id)
            .ok_or(NotifierError::RoomNotFound(room_id))?;
        let dropped = state
            .subscriptions
            .remove(&room_id)
            .map_or(0, |subs| subs.len());
        self.persist(&state).await;

        info!(
            target: "notifier.registry",
            room_id = %room_id,
            subscriptions_removed = dropped,
            "Room removed"
        );
        Ok(info)
    }

    pub async fn room(&self, room_id: RoomId) -> Option<RoomInfo> {
        self.state.read().await.room_info.get(&room_id).cloned()
    }

    /// All registered rooms in id order.
    pub async fn rooms(&self) -> Vec<(RoomId, RoomInfo)> {
        self.state
            .read()
            .await
            .room_info
            .iter()
            .map(|(id, info)| (*id, info.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe a destination to a room with default rules.
    ///
    /// Returns `true` if the pair was created, `false` if it already existed.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if the room is not registered.
    pub async fn subscribe(
        &self,
        room_id: RoomId,
        destination: DestinationId,
    ) -> Result<bool, NotifierError> {
        let mut state = self.state.write().await;
        if !state.room_info.contains_key(&room_id) {
            return Err(NotifierError::RoomNotFound(room_id));
        }

        let subs = state.subscriptions.entry(room_id).or_default();
        if subs.contains_key(&destination) {
            return Ok(false);
        }
        debug!(
            target: "notifier.registry",
            room_id = %room_id,
            destination = %destination,
            "Subscription created"
        );
        subs.insert(destination, SubscriptionConfig::default());
        self.persist(&state).await;
        Ok(true)
    }

    /// Remove a subscription.
    ///
    /// # Errors
    ///
    /// `NotSubscribed` if the pair does not exist.
    pub async fn unsubscribe(
        &self,
        room_id: RoomId,
        destination: &DestinationId,
    ) -> Result<(), NotifierError> {
        let mut state = self.state.write().await;
        let subs = state
            .subscriptions
            .get_mut(&room_id)
            .ok_or(NotifierError::NotSubscribed(room_id))?;
        if subs.remove(destination).is_none() {
            return Err(NotifierError::NotSubscribed(room_id));
        }
        if subs.is_empty() {
            state.subscriptions.remove(&room_id);
        }
        debug!(
            target: "notifier.registry",
            room_id = %room_id,
            destination = %destination,
            "Subscription removed"
        );
        self.persist(&state).await;
        Ok(())
    }

    /// Set one flag of an existing subscription.
    ///
    /// # Errors
    ///
    /// `NotSubscribed` if the pair does not exist; nothing is changed or saved.
    pub async fn set_config(
        &self,
        room_id: RoomId,
        destination: &DestinationId,
        field: ConfigField,
        value: bool,
    ) -> Result<SubscriptionConfig, NotifierError> {
        self.update_flag(room_id, destination, field, Some(value))
            .await
    }

    /// Set a flag to `value`, or flip it when `value` is `None`.
    ///
    /// Returns the new value of the flag.
    ///
    /// # Errors
    ///
    /// `NotSubscribed` if the pair does not exist; nothing is changed or saved.
    pub async fn toggle_config(
        &self,
        room_id: RoomId,
        destination: &DestinationId,
        field: ConfigField,
        value: Option<bool>,
    ) -> Result<bool, NotifierError> {
        self.update_flag(room_id, destination, field, value)
            .await
            .map(|config| config.get(field))
    }

    async fn update_flag(
        &self,
        room_id: RoomId,
        destination: &DestinationId,
        field: ConfigField,
        value: Option<bool>,
    ) -> Result<SubscriptionConfig, NotifierError> {
        let mut state = self.state.write().await;
        let config = state
            .subscriptions
            .get_mut(&room_id)
            .and_then(|subs| subs.get_mut(destination))
            .ok_or(NotifierError::NotSubscribed(room_id))?;

        let current = config.get(field);
        let next = value.unwrap_or(!current);
        config.set(field, next);
        let updated = *config;

        if next != current {
            self.persist(&state).await;
        }

        debug!(
            target: "notifier.registry",
            room_id = %room_id,
            destination = %destination,
            field = %field,
            value = next,
            "Subscription config updated"
        );
        Ok(updated)
    }

    /// Current (destination, config) pairs for a room.
    pub async fn destinations_for(&self, room_id: RoomId) -> Vec<(DestinationId, SubscriptionConfig)> {
        self.state
            .read()
            .await
            .subscriptions
            .get(&room_id)
            .map(|subs| {
                subs.iter()
                    .map(|(dest, config)| (dest.clone(), *config))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rooms a destination is subscribed to.
    pub async fn subscriptions_of(
        &self,
        destination: &DestinationId,
    ) -> Vec<(RoomId, SubscriptionConfig)> {
        self.state
            .read()
            .await
            .subscriptions
            .iter()
            .filter_map(|(room_id, subs)| subs.get(destination).map(|c| (*room_id, *c)))
            .collect()
    }

    pub async fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.state
            .read()
            .await
            .subscriptions
            .get(&room_id)
            .map_or(0, |subs| subs.len())
    }

    pub async fn total_subscriptions(&self) -> usize {
        self.state.read().await.subscription_count()
    }

    /// Copy of the full registry state.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().await.clone()
    }

    /// Mutations applied since the last successful save.
    #[must_use]
    pub fn unsaved_changes(&self) -> u64 {
        self.unsaved.load(Ordering::SeqCst)
    }

    /// Save the current state (used at shutdown).
    pub async fn flush(&self) {
        let state = self.state.write().await;
        self.persist(&state).await;
    }

    /// Save a snapshot while the caller holds the write lock.
    async fn persist(&self, snapshot: &RegistrySnapshot) {
        let manager = self.persistence.clone();
        let owned = snapshot.clone();
        let result = tokio::task::spawn_blocking(move || manager.save(&owned)).await;

        match result {
            Ok(Ok(())) => {
                self.unsaved.store(0, Ordering::SeqCst);
                metrics::record_persistence_save(true);
                metrics::set_unsaved_changes(0);
            }
            Ok(Err(e)) => self.record_save_failure(&e.to_string()),
            Err(e) => self.record_save_failure(&e.to_string()),
        }
    }

    fn record_save_failure(&self, detail: &str) {
        let unsaved = self.unsaved.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_persistence_save(false);
        metrics::set_unsaved_changes(unsaved);
        error!(
            target: "notifier.registry",
            path = %self.persistence.path().display(),
            error = %detail,
            unsaved_changes = unsaved,
            "Failed to save registry, keeping in-memory state"
        );
    }
}
