//! `ConnectionSupervisor` - singleton owner of room actors and their links.
//!
//! - Spawns a `RoomActor` and a link worker per watched room, lazily on `watch`
//! - Routes raw events from all links to the matching room, in arrival order
//! - Discards events for rooms that are not watched
//! - Owns the root `CancellationToken` (supervisor → room → link)
//! - Monitors room actors and link workers for panics
//!
//! # Graceful Shutdown
//!
//! On shutdown the supervisor stops accepting watches, cancels the root token
//! (which cancels pending cooldown timers and reconnect delays), then waits a
//! bounded time for each room and link task to finish.

use super::link::LinkWorker;
use super::messages::{LinkReport, RoomStatus, SupervisorMessage, SupervisorStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle};
use crate::clients::{RawEvent, StreamClient};
use crate::errors::NotifierError;
use crate::lifecycle::LifecycleState;
use crate::notification::Notification;
use common::types::RoomId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the supervisor mailbox.
const SUPERVISOR_CHANNEL_BUFFER: usize = 1000;

/// Buffer for the shared link report channel.
const LINK_REPORT_BUFFER: usize = 1000;

/// How long to wait for a cancelled task before giving up on it.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing parameters for watched rooms.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Grace window between an observed offline and live-end.
    pub cooldown: Duration,
    /// Fixed delay before reconnecting a failed link.
    pub reconnect_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(90),
            reconnect_delay: Duration::from_secs(10),
        }
    }
}

/// Handle to the `ConnectionSupervisor`.
#[derive(Clone)]
pub struct ConnectionSupervisorHandle {
    sender: mpsc::Sender<SupervisorMessage>,
    cancel_token: CancellationToken,
}

impl ConnectionSupervisorHandle {
    /// Start monitoring a room. Returns `false` if it was already watched.
    pub async fn watch(&self, room_id: RoomId) -> Result<bool, NotifierError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SupervisorMessage::Watch {
                room_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| NotifierError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| NotifierError::Internal(format!("response receive failed: {e}")))?
    }

    /// Stop monitoring a room. Returns `false` if it was not watched.
    pub async fn unwatch(&self, room_id: RoomId) -> Result<bool, NotifierError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SupervisorMessage::Unwatch {
                room_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| NotifierError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| NotifierError::Internal(format!("response receive failed: {e}")))
    }

    /// Force a fresh link for one room, or for every room when `room_id` is `None`.
    ///
    /// Returns the number of links restarted.
    pub async fn restart(&self, room_id: Option<RoomId>) -> Result<usize, NotifierError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SupervisorMessage::Restart {
                room_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| NotifierError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| NotifierError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get per-room lifecycle and link status.
    pub async fn status(&self) -> Result<SupervisorStatus, NotifierError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SupervisorMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| NotifierError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| NotifierError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), NotifierError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SupervisorMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| NotifierError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| NotifierError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the supervisor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Link worker owned by a watched room.
struct ManagedLink {
    cancel_token: CancellationToken,
    task_handle: JoinHandle<()>,
}

/// Internal state for a watched room.
struct WatchedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
    /// Token the room actor runs under; link tokens are its children.
    room_token: CancellationToken,
    link: ManagedLink,
    /// Generation of the current link worker.
    generation: u64,
    connected: bool,
    reconnects: u64,
}

/// The `ConnectionSupervisor` implementation.
pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    client: Arc<dyn StreamClient>,
    receiver: mpsc::Receiver<SupervisorMessage>,
    link_tx: mpsc::Sender<LinkReport>,
    link_rx: mpsc::Receiver<LinkReport>,
    /// Room actors push notifications here.
    notify_tx: mpsc::Sender<Notification>,
    /// Root cancellation token.
    cancel_token: CancellationToken,
    rooms: BTreeMap<RoomId, WatchedRoom>,
    /// Last link generation handed out, across all rooms.
    last_generation: u64,
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl ConnectionSupervisor {
    /// Spawn the supervisor. No link is opened until a room is watched.
    ///
    /// # Arguments
    ///
    /// * `config` - Cooldown and reconnect timing
    /// * `client` - Stream protocol client used by every link worker
    /// * `notify_tx` - Dispatcher queue that room actors publish to
    /// * `metrics` - Shared actor metrics
    pub fn spawn(
        config: SupervisorConfig,
        client: Arc<dyn StreamClient>,
        notify_tx: mpsc::Sender<Notification>,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionSupervisorHandle, JoinHandle<()>) {
        let (actor, handle) = Self::new(config, client, notify_tx, metrics);
        let task_handle = tokio::spawn(actor.run());
        (handle, task_handle)
    }

    fn new(
        config: SupervisorConfig,
        client: Arc<dyn StreamClient>,
        notify_tx: mpsc::Sender<Notification>,
        metrics: Arc<ActorMetrics>,
    ) -> (Self, ConnectionSupervisorHandle) {
        let (sender, receiver) = mpsc::channel(SUPERVISOR_CHANNEL_BUFFER);
        let (link_tx, link_rx) = mpsc::channel(LINK_REPORT_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = Self {
            config,
            client,
            receiver,
            link_tx,
            link_rx,
            notify_tx,
            cancel_token: cancel_token.clone(),
            rooms: BTreeMap::new(),
            last_generation: 0,
            accepting_new: true,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Supervisor, "supervisor"),
        };

        (
            actor,
            ConnectionSupervisorHandle {
                sender,
                cancel_token,
            },
        )
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "notifier.actor.supervisor")]
    async fn run(mut self) {
        info!(
            target: "notifier.actor.supervisor",
            cooldown_secs = self.config.cooldown.as_secs(),
            reconnect_delay_secs = self.config.reconnect_delay.as_secs(),
            "ConnectionSupervisor started"
        );

        loop {
            self.check_room_health().await;

            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "notifier.actor.supervisor",
                        "ConnectionSupervisor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_receive(self.receiver.len());
                            self.handle_message(message).await;
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "notifier.actor.supervisor",
                                "ConnectionSupervisor channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }

                Some(report) = self.link_rx.recv() => {
                    self.handle_link_report(report).await;
                }
            }
        }

        info!(
            target: "notifier.actor.supervisor",
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionSupervisor stopped"
        );
    }

    async fn handle_message(&mut self, message: SupervisorMessage) {
        match message {
            SupervisorMessage::Watch {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.watch(room_id));
            }

            SupervisorMessage::Unwatch {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.unwatch(room_id));
            }

            SupervisorMessage::Restart {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.restart(room_id));
            }

            SupervisorMessage::GetStatus { respond_to } => {
                let status = self.get_status().await;
                let _ = respond_to.send(status);
            }

            SupervisorMessage::Shutdown { respond_to } => {
                info!(
                    target: "notifier.actor.supervisor",
                    rooms = self.rooms.len(),
                    "Initiating graceful shutdown"
                );
                self.accepting_new = false;
                self.cancel_token.cancel();
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    fn watch(&mut self, room_id: RoomId) -> Result<bool, NotifierError> {
        if !self.accepting_new {
            return Err(NotifierError::Draining);
        }
        if self.rooms.contains_key(&room_id) {
            return Ok(false);
        }

        let room_token = self.cancel_token.child_token();
        let (handle, task_handle) = RoomActor::spawn(
            room_id,
            self.config.cooldown,
            room_token.clone(),
            self.notify_tx.clone(),
            Arc::clone(&self.metrics),
        );
        let generation = self.next_generation();
        let link = self.spawn_link(room_id, generation, &room_token);

        self.rooms.insert(
            room_id,
            WatchedRoom {
                handle,
                task_handle,
                room_token,
                link,
                generation,
                connected: false,
                reconnects: 0,
            },
        );
        self.metrics.room_watched();

        info!(
            target: "notifier.actor.supervisor",
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room watched"
        );

        Ok(true)
    }

    fn unwatch(&mut self, room_id: RoomId) -> bool {
        let Some(room) = self.rooms.remove(&room_id) else {
            return false;
        };

        // Cancels the room actor and its link worker.
        room.handle.cancel();
        if room.connected {
            self.metrics.link_disconnected();
        }
        self.metrics.room_unwatched();

        reap(room_id, "room actor", room.task_handle);
        reap(room_id, "link worker", room.link.task_handle);

        info!(
            target: "notifier.actor.supervisor",
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room unwatched"
        );

        true
    }

    fn restart(&mut self, room_id: Option<RoomId>) -> Result<usize, NotifierError> {
        let targets: Vec<RoomId> = match room_id {
            Some(id) if self.rooms.contains_key(&id) => vec![id],
            Some(id) => return Err(NotifierError::RoomNotWatched(id)),
            None => self.rooms.keys().copied().collect(),
        };

        for id in &targets {
            self.restart_link(*id);
        }

        info!(
            target: "notifier.actor.supervisor",
            restarted = targets.len(),
            "Links restarted"
        );
        Ok(targets.len())
    }

    fn restart_link(&mut self, room_id: RoomId) {
        let generation = self.next_generation();
        let Some(room) = self.rooms.get(&room_id) else {
            return;
        };
        let new_link = self.spawn_link(room_id, generation, &room.room_token);

        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let old_link = std::mem::replace(&mut room.link, new_link);
        room.generation = generation;
        let was_connected = std::mem::replace(&mut room.connected, false);

        old_link.cancel_token.cancel();
        reap(room_id, "link worker", old_link.task_handle);
        if was_connected {
            self.metrics.link_disconnected();
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.last_generation += 1;
        self.last_generation
    }

    fn spawn_link(
        &self,
        room_id: RoomId,
        generation: u64,
        room_token: &CancellationToken,
    ) -> ManagedLink {
        let cancel_token = room_token.child_token();
        let task_handle = LinkWorker::spawn(
            room_id,
            generation,
            Arc::clone(&self.client),
            self.link_tx.clone(),
            self.config.reconnect_delay,
            cancel_token.clone(),
        );
        ManagedLink {
            cancel_token,
            task_handle,
        }
    }

    async fn handle_link_report(&mut self, report: LinkReport) {
        match report {
            LinkReport::Event { generation, event } => {
                let current = event
                    .room_id()
                    .and_then(|room_id| self.rooms.get(&room_id))
                    .map(|room| room.generation);
                if current.is_some_and(|current| current != generation) {
                    debug!(
                        target: "notifier.actor.supervisor",
                        generation,
                        "Discarding event from a replaced link"
                    );
                    return;
                }
                self.route(event).await;
            }

            LinkReport::Connected {
                room_id,
                generation,
            } => {
                let Some(room) = self.rooms.get_mut(&room_id) else {
                    return;
                };
                if room.generation != generation || room.connected {
                    return;
                }
                room.connected = true;
                self.metrics.link_connected();
                if let Err(e) = room.handle.set_link_up(true).await {
                    warn!(
                        target: "notifier.actor.supervisor",
                        room_id = %room_id,
                        error = %e,
                        "Failed to resume room lifecycle"
                    );
                }
            }

            LinkReport::Down {
                room_id,
                generation,
                reason,
            } => {
                let Some(room) = self.rooms.get_mut(&room_id) else {
                    return;
                };
                if room.generation != generation {
                    return;
                }
                room.reconnects += 1;
                let was_connected = std::mem::replace(&mut room.connected, false);
                let reconnects = room.reconnects;
                if was_connected {
                    self.metrics.link_disconnected();
                }
                if let Err(e) = room.handle.set_link_up(false).await {
                    warn!(
                        target: "notifier.actor.supervisor",
                        room_id = %room_id,
                        error = %e,
                        "Failed to freeze room lifecycle"
                    );
                }
                debug!(
                    target: "notifier.actor.supervisor",
                    room_id = %room_id,
                    reason = %reason,
                    reconnects,
                    "Link down, room state frozen until reconnect"
                );
            }
        }
    }

    /// Deliver a raw event to its room's actor.
    async fn route(&mut self, event: RawEvent) {
        let Some(room_id) = event.room_id() else {
            return;
        };
        let Some(room) = self.rooms.get(&room_id) else {
            debug!(
                target: "notifier.actor.supervisor",
                room_id = %room_id,
                "Discarding event for unwatched room"
            );
            return;
        };

        if let Err(e) = room.handle.deliver(event).await {
            warn!(
                target: "notifier.actor.supervisor",
                room_id = %room_id,
                error = %e,
                "Failed to deliver event to room actor"
            );
        }
    }

    async fn get_status(&self) -> SupervisorStatus {
        let mut rooms = Vec::with_capacity(self.rooms.len());

        for (room_id, room) in &self.rooms {
            let (state, live_since) = match room.handle.get_state().await {
                Ok(snapshot) => (snapshot.state, snapshot.live_since),
                Err(_) => {
                    warn!(
                        target: "notifier.actor.supervisor",
                        room_id = %room_id,
                        "Failed to query room actor state"
                    );
                    (LifecycleState::Unknown, None)
                }
            };
            rooms.push(RoomStatus {
                room_id: *room_id,
                state,
                live_since,
                connected: room.connected,
                reconnects: room.reconnects,
            });
        }

        SupervisorStatus {
            rooms,
            is_draining: !self.accepting_new,
            mailbox_depth: self.receiver.len(),
        }
    }

    async fn graceful_shutdown(&mut self) {
        self.accepting_new = false;

        info!(
            target: "notifier.actor.supervisor",
            rooms = self.rooms.len(),
            "Performing graceful shutdown"
        );

        for room in self.rooms.values() {
            room.handle.cancel();
        }

        let rooms = std::mem::take(&mut self.rooms);
        for (room_id, room) in rooms {
            await_stopped(room_id, "room actor", room.task_handle).await;
            await_stopped(room_id, "link worker", room.link.task_handle).await;
            self.metrics.room_unwatched();
            if room.connected {
                self.metrics.link_disconnected();
            }
        }

        info!(
            target: "notifier.actor.supervisor",
            "Graceful shutdown complete"
        );
    }

    /// Respawn room actors and link workers whose task ended unexpectedly.
    async fn check_room_health(&mut self) {
        let finished: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.task_handle.is_finished() || room.link.task_handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for room_id in finished {
            if self.cancel_token.is_cancelled() {
                return;
            }
            let Some(room) = self.rooms.get_mut(&room_id) else {
                continue;
            };

            if room.task_handle.is_finished() {
                let (handle, task_handle) = RoomActor::spawn(
                    room_id,
                    self.config.cooldown,
                    room.room_token.clone(),
                    self.notify_tx.clone(),
                    Arc::clone(&self.metrics),
                );
                room.handle = handle;
                let old = std::mem::replace(&mut room.task_handle, task_handle);
                if let Err(join_error) = old.await {
                    if join_error.is_panic() {
                        error!(
                            target: "notifier.actor.supervisor",
                            room_id = %room_id,
                            error = ?join_error,
                            "Room actor panicked - respawned with unknown state"
                        );
                        self.metrics.record_panic(ActorType::Room);
                    }
                }
            }

            if self.rooms.get(&room_id).is_some_and(|r| r.link.task_handle.is_finished()) {
                self.restart_link(room_id);
                warn!(
                    target: "notifier.actor.supervisor",
                    room_id = %room_id,
                    "Link worker ended unexpectedly - restarted"
                );
            }
        }
    }
}

/// Wait for a cancelled task in the background, logging how it ended.
fn reap(room_id: RoomId, what: &'static str, task_handle: JoinHandle<()>) {
    tokio::spawn(await_stopped(room_id, what, task_handle));
}

async fn await_stopped(room_id: RoomId, what: &'static str, task_handle: JoinHandle<()>) {
    match tokio::time::timeout(TASK_STOP_TIMEOUT, task_handle).await {
        Ok(Ok(())) => {
            debug!(
                target: "notifier.actor.supervisor",
                room_id = %room_id,
                task = what,
                "Task completed cleanly"
            );
        }
        Ok(Err(e)) => {
            warn!(
                target: "notifier.actor.supervisor",
                room_id = %room_id,
                task = what,
                error = ?e,
                "Task panicked during shutdown"
            );
        }
        Err(_) => {
            warn!(
                target: "notifier.actor.supervisor",
                room_id = %room_id,
                task = what,
                "Task shutdown timed out"
            );
        }
    }
}
