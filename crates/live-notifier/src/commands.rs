//! Command service.
//!
//! Executes already-parsed admin and user commands on behalf of a
//! destination. Commands mutate the registry (which persists itself) and tell
//! the supervisor which rooms to watch. Permission checks belong to the
//! command router in front of this service.

use crate::actors::{ConnectionSupervisorHandle, RoomStatus};
use crate::clients::NameResolver;
use crate::errors::{NotifierError, ResolveError};
use crate::observability::metrics as prom;
use crate::registry::model::{ConfigField, RoomInfo, SubscriptionConfig};
use crate::registry::SubscriptionRegistry;
use chrono::Local;
use common::types::{DestinationId, RoomId};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const RULE: &str = "--------------";

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Register and watch a room. `name` overrides the resolved display name.
    Add {
        room_id: RoomId,
        #[serde(default)]
        name: Option<String>,
    },
    /// Stop watching a room and drop its subscriptions.
    Del { room_id: RoomId },
    /// List registered rooms.
    Ls,
    /// Subscribe the invoking destination.
    Sub { room_id: RoomId },
    /// Unsubscribe the invoking destination.
    Unsub { room_id: RoomId },
    /// Rooms the invoking destination is subscribed to.
    Mysub,
    /// Monitoring status.
    Status,
    /// Restart one room's link, or every link.
    Restart {
        #[serde(default)]
        room_id: Option<RoomId>,
    },
    /// Mass-mention on live-start. A missing value toggles.
    Atall {
        room_id: RoomId,
        #[serde(default, deserialize_with = "deserialize_switch")]
        value: Option<bool>,
    },
    /// Gift notifications.
    Gift {
        room_id: RoomId,
        #[serde(default, deserialize_with = "deserialize_switch")]
        value: Option<bool>,
    },
    /// High-value-only gift filter.
    Giftfilter {
        room_id: RoomId,
        #[serde(default, deserialize_with = "deserialize_switch")]
        value: Option<bool>,
    },
}

impl Command {
    /// Command name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Del { .. } => "del",
            Command::Ls => "ls",
            Command::Sub { .. } => "sub",
            Command::Unsub { .. } => "unsub",
            Command::Mysub => "mysub",
            Command::Status => "status",
            Command::Restart { .. } => "restart",
            Command::Atall { .. } => "atall",
            Command::Gift { .. } => "gift",
            Command::Giftfilter { .. } => "giftfilter",
        }
    }
}

/// Accepts `true`/`false`, `"on"`/`"off"`, or null.
fn deserialize_switch<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Switch {
        Bool(bool),
        Text(String),
    }

    match Option::<Switch>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Switch::Bool(b)) => Ok(Some(b)),
        Some(Switch::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" => Ok(Some(true)),
            "off" | "false" => Ok(Some(false)),
            "" => Ok(None),
            other => Err(serde::de::Error::custom(format!(
                "expected on/off, got '{other}'"
            ))),
        },
    }
}

/// Who issued a command, and where.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Destination the command came from; subscriptions are keyed by it.
    pub destination: DestinationId,
    /// User id of the invoker, recorded as `added_by`.
    pub invoker: String,
}

/// One registered room in an `ls` reply.
#[derive(Debug, Clone, Serialize)]
pub struct RoomListing {
    pub room_id: RoomId,
    pub name: String,
    pub subscribers: usize,
    pub watching: bool,
    /// The invoking destination's rules, if it is subscribed.
    pub subscription: Option<SubscriptionConfig>,
}

/// One subscription in a `mysub` reply.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionListing {
    pub room_id: RoomId,
    pub name: String,
    pub config: SubscriptionConfig,
}

/// `status` reply.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Registered rooms.
    pub rooms: usize,
    pub watching: usize,
    /// Rooms live or cooling down.
    pub live: usize,
    pub total_subscriptions: usize,
    /// Registry mutations not yet saved.
    pub unsaved_changes: u64,
    pub room_status: Vec<RoomStatus>,
}

/// Structured command result.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    RoomAdded {
        room_id: RoomId,
        name: String,
    },
    RoomRemoved {
        room_id: RoomId,
        name: String,
    },
    Rooms {
        rooms: Vec<RoomListing>,
    },
    Subscribed {
        room_id: RoomId,
        name: String,
        watching: bool,
    },
    Unsubscribed {
        room_id: RoomId,
        name: String,
    },
    Subscriptions {
        subscriptions: Vec<SubscriptionListing>,
    },
    Status(StatusReport),
    Restarted {
        restarted: usize,
        total: usize,
    },
    ConfigUpdated {
        room_id: RoomId,
        name: String,
        field: ConfigField,
        enabled: bool,
        config: SubscriptionConfig,
    },
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

impl CommandReply {
    /// Plain-text rendering for chat.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            CommandReply::RoomAdded { room_id, name } => format!(
                "Room added\nRoom: {room_id}\nName: {name}\nUse `sub {room_id}` to get live notifications"
            ),
            CommandReply::RoomRemoved { room_id, name } => {
                format!("Stopped monitoring {name} ({room_id})")
            }
            CommandReply::Rooms { rooms } => {
                if rooms.is_empty() {
                    return "No rooms are monitored\nUse `add <room_id>` to add one".to_string();
                }
                let mut out = format!("Monitored rooms\n{RULE}");
                for (idx, room) in rooms.iter().enumerate() {
                    let _ = write!(
                        out,
                        "\n{}. {}\n   Room: {}\n   Subscribers: {}\n   Status: {}",
                        idx + 1,
                        room.name,
                        room.room_id,
                        room.subscribers,
                        if room.watching { "running" } else { "stopped" },
                    );
                    if let Some(config) = &room.subscription {
                        let _ = write!(
                            out,
                            "\n   Here: @all {} | gifts {} ({})",
                            on_off(config.at_all),
                            on_off(config.gift_notify),
                            if config.high_value_only { "high value only" } else { "all" },
                        );
                    }
                }
                out
            }
            CommandReply::Subscribed {
                room_id,
                name,
                watching,
            } => {
                let mut out = format!(
                    "Subscribed\nRoom: {name} ({room_id})\nLive notifications will arrive here"
                );
                if !*watching {
                    out.push_str("\nNote: this room is not being monitored right now");
                }
                out
            }
            CommandReply::Unsubscribed { room_id, name } => {
                format!("Unsubscribed from {name} ({room_id})")
            }
            CommandReply::Subscriptions { subscriptions } => {
                if subscriptions.is_empty() {
                    return "No subscriptions yet\nUse `ls` to see rooms and `sub <room_id>` to subscribe"
                        .to_string();
                }
                let mut out = format!("Your subscriptions\n{RULE}");
                for sub in subscriptions {
                    let _ = write!(out, "\n- {} ({})", sub.name, sub.room_id);
                }
                out
            }
            CommandReply::Status(report) => format!(
                "Monitoring status\n{RULE}\nRooms: {}\nRunning: {}\nLive: {}\nSubscriptions: {}\nUnsaved changes: {}",
                report.rooms,
                report.watching,
                report.live,
                report.total_subscriptions,
                report.unsaved_changes,
            ),
            CommandReply::Restarted { restarted, total } => {
                format!("Restarted {restarted}/{total} room monitors")
            }
            CommandReply::ConfigUpdated {
                room_id,
                name,
                field,
                enabled,
                config,
            } => match field {
                ConfigField::AtAll => {
                    format!("{name} ({room_id})\n@all on live start: {}", on_off(*enabled))
                }
                ConfigField::GiftNotify => format!(
                    "{name} ({room_id})\nGift notifications: {}\nFilter: {}",
                    on_off(*enabled),
                    if config.high_value_only { "high value only" } else { "all gifts" },
                ),
                ConfigField::HighValueOnly => {
                    if *enabled {
                        format!("{name} ({room_id})\nGift filter: high value gifts only")
                    } else {
                        format!("{name} ({room_id})\nGift filter: all gifts")
                    }
                }
            },
        }
    }
}

/// Executes commands against the registry and supervisor.
#[derive(Clone)]
pub struct CommandService {
    registry: Arc<SubscriptionRegistry>,
    supervisor: ConnectionSupervisorHandle,
    resolver: Arc<dyn NameResolver>,
}

impl CommandService {
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        supervisor: ConnectionSupervisorHandle,
        resolver: Arc<dyn NameResolver>,
    ) -> Self {
        Self {
            registry,
            supervisor,
            resolver,
        }
    }

    /// Watch every stored room. Returns how many rooms are watched.
    pub async fn start(&self) -> Result<usize, NotifierError> {
        let rooms = self.registry.rooms().await;
        for (room_id, _) in &rooms {
            self.supervisor.watch(*room_id).await?;
        }
        info!(
            target: "notifier.commands",
            rooms = rooms.len(),
            "Watching stored rooms"
        );
        Ok(rooms.len())
    }

    /// Execute one command for `ctx`.
    #[instrument(
        skip_all,
        name = "notifier.commands",
        fields(command = command.name(), destination = %ctx.destination)
    )]
    pub async fn execute(
        &self,
        ctx: &CommandContext,
        command: Command,
    ) -> Result<CommandReply, NotifierError> {
        let name = command.name();

        let result = match command {
            Command::Add { room_id, name } => self.add(ctx, room_id, name).await,
            Command::Del { room_id } => self.del(room_id).await,
            Command::Ls => self.ls(ctx).await,
            Command::Sub { room_id } => self.sub(ctx, room_id).await,
            Command::Unsub { room_id } => self.unsub(ctx, room_id).await,
            Command::Mysub => self.mysub(ctx).await,
            Command::Status => self.status().await,
            Command::Restart { room_id } => self.restart(room_id).await,
            Command::Atall { room_id, value } => {
                self.update(ctx, room_id, ConfigField::AtAll, value).await
            }
            Command::Gift { room_id, value } => {
                self.update(ctx, room_id, ConfigField::GiftNotify, value)
                    .await
            }
            Command::Giftfilter { room_id, value } => {
                self.update(ctx, room_id, ConfigField::HighValueOnly, value)
                    .await
            }
        };

        prom::record_command(name, result.is_ok());
        if let Err(e) = &result {
            info!(
                target: "notifier.commands",
                command = name,
                error = %e,
                "Command rejected"
            );
        }
        result
    }

    async fn add(
        &self,
        ctx: &CommandContext,
        room_id: RoomId,
        name: Option<String>,
    ) -> Result<CommandReply, NotifierError> {
        if self.registry.room(room_id).await.is_some() {
            return Err(NotifierError::Conflict(format!(
                "room {room_id} is already monitored"
            )));
        }

        // Resolving also validates that the room exists.
        let resolved = self
            .resolver
            .resolve_name(room_id)
            .await
            .map_err(|e| match e {
                ResolveError::NotFound => NotifierError::RoomNotFound(room_id),
                ResolveError::Unavailable(detail) => {
                    NotifierError::Internal(format!("room lookup failed: {detail}"))
                }
            })?;
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or(resolved);

        self.registry
            .add_room(
                room_id,
                RoomInfo {
                    name: name.clone(),
                    added_by: ctx.invoker.clone(),
                    added_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                },
            )
            .await?;

        if let Err(e) = self.supervisor.watch(room_id).await {
            warn!(
                target: "notifier.commands",
                room_id = %room_id,
                error = %e,
                "Failed to start monitoring, rolling back"
            );
            let _ = self.registry.remove_room(room_id).await;
            return Err(e);
        }

        info!(
            target: "notifier.commands",
            room_id = %room_id,
            name = %name,
            added_by = %ctx.invoker,
            "Room added"
        );
        Ok(CommandReply::RoomAdded { room_id, name })
    }

    async fn del(&self, room_id: RoomId) -> Result<CommandReply, NotifierError> {
        let info = self.registry.remove_room(room_id).await?;
        self.supervisor.unwatch(room_id).await?;

        info!(
            target: "notifier.commands",
            room_id = %room_id,
            "Room removed"
        );
        Ok(CommandReply::RoomRemoved {
            room_id,
            name: info.name,
        })
    }

    async fn ls(&self, ctx: &CommandContext) -> Result<CommandReply, NotifierError> {
        let status = self.supervisor.status().await?;
        let mine: HashMap<RoomId, SubscriptionConfig> = self
            .registry
            .subscriptions_of(&ctx.destination)
            .await
            .into_iter()
            .collect();

        let mut rooms = Vec::new();
        for (room_id, info) in self.registry.rooms().await {
            rooms.push(RoomListing {
                room_id,
                name: info.name,
                subscribers: self.registry.subscriber_count(room_id).await,
                watching: status.room(room_id).is_some(),
                subscription: mine.get(&room_id).copied(),
            });
        }
        Ok(CommandReply::Rooms { rooms })
    }

    async fn sub(&self, ctx: &CommandContext, room_id: RoomId) -> Result<CommandReply, NotifierError> {
        let info = self
            .registry
            .room(room_id)
            .await
            .ok_or(NotifierError::RoomNotFound(room_id))?;

        if !self
            .registry
            .subscribe(room_id, ctx.destination.clone())
            .await?
        {
            return Err(NotifierError::AlreadySubscribed(room_id));
        }

        let watching = self.supervisor.status().await?.room(room_id).is_some();
        Ok(CommandReply::Subscribed {
            room_id,
            name: info.name,
            watching,
        })
    }

    async fn unsub(
        &self,
        ctx: &CommandContext,
        room_id: RoomId,
    ) -> Result<CommandReply, NotifierError> {
        self.registry.unsubscribe(room_id, &ctx.destination).await?;
        Ok(CommandReply::Unsubscribed {
            room_id,
            name: self.display_name(room_id).await,
        })
    }

    async fn mysub(&self, ctx: &CommandContext) -> Result<CommandReply, NotifierError> {
        let mut subscriptions = Vec::new();
        for (room_id, config) in self.registry.subscriptions_of(&ctx.destination).await {
            subscriptions.push(SubscriptionListing {
                room_id,
                name: self.display_name(room_id).await,
                config,
            });
        }
        Ok(CommandReply::Subscriptions { subscriptions })
    }

    async fn status(&self) -> Result<CommandReply, NotifierError> {
        let status = self.supervisor.status().await?;
        Ok(CommandReply::Status(StatusReport {
            rooms: self.registry.rooms().await.len(),
            watching: status.watching(),
            live: status.live_count(),
            total_subscriptions: self.registry.total_subscriptions().await,
            unsaved_changes: self.registry.unsaved_changes(),
            room_status: status.rooms,
        }))
    }

    async fn restart(&self, room_id: Option<RoomId>) -> Result<CommandReply, NotifierError> {
        match room_id {
            Some(room_id) => {
                if self.registry.room(room_id).await.is_none() {
                    return Err(NotifierError::RoomNotFound(room_id));
                }
                self.restart_room(room_id).await?;
                Ok(CommandReply::Restarted {
                    restarted: 1,
                    total: 1,
                })
            }
            None => {
                let rooms = self.registry.rooms().await;
                let mut restarted = 0;
                for (room_id, _) in &rooms {
                    match self.restart_room(*room_id).await {
                        Ok(()) => restarted += 1,
                        Err(e) => warn!(
                            target: "notifier.commands",
                            room_id = %room_id,
                            error = %e,
                            "Failed to restart room monitor"
                        ),
                    }
                }
                Ok(CommandReply::Restarted {
                    restarted,
                    total: rooms.len(),
                })
            }
        }
    }

    /// Restart a registered room's link, watching it again if it was dropped.
    async fn restart_room(&self, room_id: RoomId) -> Result<(), NotifierError> {
        match self.supervisor.restart(Some(room_id)).await {
            Ok(_) => Ok(()),
            Err(NotifierError::RoomNotWatched(_)) => {
                self.supervisor.watch(room_id).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(
        &self,
        ctx: &CommandContext,
        room_id: RoomId,
        field: ConfigField,
        value: Option<bool>,
    ) -> Result<CommandReply, NotifierError> {
        let info = self
            .registry
            .room(room_id)
            .await
            .ok_or(NotifierError::RoomNotFound(room_id))?;

        let config = match value {
            Some(value) => {
                self.registry
                    .set_config(room_id, &ctx.destination, field, value)
                    .await?
            }
            None => {
                self.registry
                    .toggle_config(room_id, &ctx.destination, field, None)
                    .await?;
                self.registry
                    .subscriptions_of(&ctx.destination)
                    .await
                    .into_iter()
                    .find_map(|(id, config)| (id == room_id).then_some(config))
                    .ok_or(NotifierError::NotSubscribed(room_id))?
            }
        };

        Ok(CommandReply::ConfigUpdated {
            room_id,
            name: info.name,
            field,
            enabled: config.get(field),
            config,
        })
    }

    async fn display_name(&self, room_id: RoomId) -> String {
        self.registry
            .room(room_id)
            .await
            .map_or_else(|| room_id.to_string(), |info| info.name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::actors::{ActorMetrics, ConnectionSupervisor, SupervisorConfig};
    use crate::clients::{StreamClient, StreamLink};
    use crate::errors::StreamError;
    use crate::persistence::PersistenceManager;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    /// Stream client whose links never connect.
    struct Unreachable;

    #[async_trait]
    impl StreamClient for Unreachable {
        async fn connect(&self, _room_id: RoomId) -> Result<Box<dyn StreamLink>, StreamError> {
            Err(StreamError::Connect("unreachable".to_string()))
        }

        async fn check_live(&self, _room_id: RoomId) -> Result<bool, StreamError> {
            Ok(false)
        }
    }

    struct Names;

    #[async_trait]
    impl NameResolver for Names {
        async fn resolve_name(&self, room_id: RoomId) -> Result<String, ResolveError> {
            match room_id.get() {
                404 => Err(ResolveError::NotFound),
                id => Ok(format!("Streamer {id}")),
            }
        }
    }

    struct Fixture {
        service: CommandService,
        registry: Arc<SubscriptionRegistry>,
        supervisor: ConnectionSupervisorHandle,
        _dir: tempfile::TempDir,
        _notifications: mpsc::Receiver<crate::notification::Notification>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            SubscriptionRegistry::open(PersistenceManager::new(dir.path().join("data.json"))).await,
        );
        let (notify_tx, notify_rx) = mpsc::channel(16);
        let (supervisor, _task) = ConnectionSupervisor::spawn(
            SupervisorConfig::default(),
            Arc::new(Unreachable),
            notify_tx,
            ActorMetrics::new(),
        );
        Fixture {
            service: CommandService::new(Arc::clone(&registry), supervisor.clone(), Arc::new(Names)),
            registry,
            supervisor,
            _dir: dir,
            _notifications: notify_rx,
        }
    }

    fn ctx(destination: &str) -> CommandContext {
        CommandContext {
            destination: DestinationId::new(destination).unwrap(),
            invoker: "admin".to_string(),
        }
    }

    #[test]
    fn test_command_deserialization() {
        let cmd: Command = serde_json::from_value(json!({"command": "add", "room_id": 1})).unwrap();
        assert_eq!(cmd, Command::Add { room_id: RoomId(1), name: None });

        let cmd: Command =
            serde_json::from_value(json!({"command": "atall", "room_id": 2, "value": "on"})).unwrap();
        assert_eq!(cmd, Command::Atall { room_id: RoomId(2), value: Some(true) });

        let cmd: Command =
            serde_json::from_value(json!({"command": "gift", "room_id": 2, "value": false})).unwrap();
        assert_eq!(cmd, Command::Gift { room_id: RoomId(2), value: Some(false) });

        let cmd: Command = serde_json::from_value(json!({"command": "restart"})).unwrap();
        assert_eq!(cmd, Command::Restart { room_id: None });

        assert!(serde_json::from_value::<Command>(
            json!({"command": "giftfilter", "room_id": 2, "value": "maybe"})
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_add_resolves_name_and_watches() {
        let f = fixture().await;

        let reply = f
            .service
            .execute(&ctx("group:1"), Command::Add { room_id: RoomId(7), name: None })
            .await
            .unwrap();
        assert!(matches!(reply, CommandReply::RoomAdded { ref name, .. } if name == "Streamer 7"));

        let info = f.registry.room(RoomId(7)).await.unwrap();
        assert_eq!(info.added_by, "admin");
        assert!(!info.added_time.is_empty());
        assert!(f.supervisor.status().await.unwrap().room(RoomId(7)).is_some());

        let dup = f
            .service
            .execute(&ctx("group:1"), Command::Add { room_id: RoomId(7), name: None })
            .await;
        assert!(matches!(dup, Err(NotifierError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_add_explicit_name_and_unknown_room() {
        let f = fixture().await;

        f.service
            .execute(
                &ctx("group:1"),
                Command::Add { room_id: RoomId(8), name: Some("Nick".to_string()) },
            )
            .await
            .unwrap();
        assert_eq!(f.registry.room(RoomId(8)).await.unwrap().name, "Nick");

        let missing = f
            .service
            .execute(&ctx("group:1"), Command::Add { room_id: RoomId(404), name: None })
            .await;
        assert!(matches!(missing, Err(NotifierError::RoomNotFound(RoomId(404)))));
        assert!(f.registry.room(RoomId(404)).await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_commands() {
        let f = fixture().await;
        let group = ctx("group:1");

        let unknown = f.service.execute(&group, Command::Sub { room_id: RoomId(7) }).await;
        assert!(matches!(unknown, Err(NotifierError::RoomNotFound(_))));

        f.service
            .execute(&group, Command::Add { room_id: RoomId(7), name: None })
            .await
            .unwrap();
        let reply = f.service.execute(&group, Command::Sub { room_id: RoomId(7) }).await.unwrap();
        assert!(matches!(reply, CommandReply::Subscribed { watching: true, .. }));

        let again = f.service.execute(&group, Command::Sub { room_id: RoomId(7) }).await;
        assert!(matches!(again, Err(NotifierError::AlreadySubscribed(_))));

        let reply = f.service.execute(&group, Command::Mysub).await.unwrap();
        match reply {
            CommandReply::Subscriptions { subscriptions } => {
                assert_eq!(subscriptions.len(), 1);
                assert_eq!(subscriptions.first().unwrap().name, "Streamer 7");
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        f.service
            .execute(&group, Command::Unsub { room_id: RoomId(7) })
            .await
            .unwrap();
        let again = f.service.execute(&group, Command::Unsub { room_id: RoomId(7) }).await;
        assert!(matches!(again, Err(NotifierError::NotSubscribed(_))));
    }

    #[tokio::test]
    async fn test_flag_commands_require_subscription() {
        let f = fixture().await;
        let group = ctx("group:1");
        f.service
            .execute(&group, Command::Add { room_id: RoomId(7), name: None })
            .await
            .unwrap();

        let result = f
            .service
            .execute(&group, Command::Atall { room_id: RoomId(7), value: Some(true) })
            .await;
        assert!(matches!(result, Err(NotifierError::NotSubscribed(_))));

        f.service.execute(&group, Command::Sub { room_id: RoomId(7) }).await.unwrap();

        let reply = f
            .service
            .execute(&group, Command::Atall { room_id: RoomId(7), value: Some(true) })
            .await
            .unwrap();
        assert!(matches!(reply, CommandReply::ConfigUpdated { enabled: true, .. }));

        // No value toggles.
        let reply = f
            .service
            .execute(&group, Command::Giftfilter { room_id: RoomId(7), value: None })
            .await
            .unwrap();
        match reply {
            CommandReply::ConfigUpdated { enabled, config, .. } => {
                assert!(!enabled);
                assert!(config.at_all);
                assert!(!config.high_value_only);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_del_ls_status_restart() {
        let f = fixture().await;
        let group = ctx("group:1");
        for room in [1, 2] {
            f.service
                .execute(&group, Command::Add { room_id: RoomId(room), name: None })
                .await
                .unwrap();
        }
        f.service.execute(&group, Command::Sub { room_id: RoomId(1) }).await.unwrap();

        let reply = f.service.execute(&group, Command::Ls).await.unwrap();
        let text = reply.text();
        assert!(text.contains("Streamer 1"));
        assert!(text.contains("Streamer 2"));
        match reply {
            CommandReply::Rooms { rooms } => {
                assert_eq!(rooms.len(), 2);
                assert!(rooms.iter().all(|r| r.watching));
                assert_eq!(rooms.iter().filter(|r| r.subscription.is_some()).count(), 1);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let reply = f.service.execute(&group, Command::Restart { room_id: None }).await.unwrap();
        assert!(matches!(reply, CommandReply::Restarted { restarted: 2, total: 2 }));
        let missing = f
            .service
            .execute(&group, Command::Restart { room_id: Some(RoomId(3)) })
            .await;
        assert!(matches!(missing, Err(NotifierError::RoomNotFound(_))));

        f.service.execute(&group, Command::Del { room_id: RoomId(1) }).await.unwrap();
        match f.service.execute(&group, Command::Status).await.unwrap() {
            CommandReply::Status(report) => {
                assert_eq!(report.rooms, 1);
                assert_eq!(report.watching, 1);
                assert_eq!(report.live, 0);
                assert_eq!(report.total_subscriptions, 0);
                assert_eq!(report.unsaved_changes, 0);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_watches_stored_rooms() {
        let f = fixture().await;
        for room in [10, 11, 12] {
            f.registry
                .add_room(
                    RoomId(room),
                    RoomInfo {
                        name: format!("r{room}"),
                        added_by: "admin".to_string(),
                        added_time: String::new(),
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(f.service.start().await.unwrap(), 3);
        assert_eq!(f.supervisor.status().await.unwrap().watching(), 3);
    }
}
