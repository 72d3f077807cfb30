//! `RoomActor` - one per watched room, owns the room's runtime state.
//!
//! The actor serializes everything that touches the room's lifecycle: routed
//! raw events and the cooldown deadline are branches of the same `select!`,
//! so a `live` that cancels a pending end and the deadline firing can never
//! both take effect.

use super::messages::{RoomMessage, RoomSnapshot};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::clients::RawEvent;
use crate::errors::NotifierError;
use crate::lifecycle::{ExpiryOutcome, LiveOutcome, OfflineOutcome, RoomLifecycle};
use crate::notification::{GiftEvent, Notification};
use crate::observability::metrics as prom;
use chrono::{DateTime, Utc};
use common::types::RoomId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 256;

/// Handle to a `RoomActor`.
#[derive(Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: RoomId,
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Deliver a routed raw event.
    pub async fn deliver(&self, event: RawEvent) -> Result<(), NotifierError> {
        self.sender
            .send(RoomMessage::Event(event))
            .await
            .map_err(|e| NotifierError::Internal(format!("channel send failed: {e}")))
    }

    /// Report the room's link as down or back up.
    pub async fn set_link_up(&self, up: bool) -> Result<(), NotifierError> {
        let message = if up {
            RoomMessage::LinkUp
        } else {
            RoomMessage::LinkDown
        };
        self.sender
            .send(message)
            .await
            .map_err(|e| NotifierError::Internal(format!("channel send failed: {e}")))
    }

    /// Get the room's runtime state.
    pub async fn get_state(&self) -> Result<RoomSnapshot, NotifierError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| NotifierError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| NotifierError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the actor. Any pending live-end is dropped.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    room_id: RoomId,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
    lifecycle: RoomLifecycle,
    /// Wall-clock start of the current session, for rendering.
    live_started_at: Option<DateTime<Utc>>,
    /// Outbound notifications, consumed by the dispatcher.
    notify_tx: mpsc::Sender<Notification>,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// # Arguments
    ///
    /// * `room_id` - Room to track
    /// * `cooldown` - Grace window between an observed offline and live-end
    /// * `cancel_token` - Child token from the supervisor
    /// * `notify_tx` - Where lifecycle and gift notifications go
    /// * `metrics` - Shared actor metrics
    pub fn spawn(
        room_id: RoomId,
        cooldown: Duration,
        cancel_token: CancellationToken,
        notify_tx: mpsc::Sender<Notification>,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id,
            receiver,
            cancel_token: cancel_token.clone(),
            lifecycle: RoomLifecycle::new(cooldown),
            live_started_at: None,
            notify_tx,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, room_id.to_string()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "notifier.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "notifier.actor.room",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            let deadline = self.lifecycle.cooldown_deadline();

            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "notifier.actor.room",
                        room_id = %self.room_id,
                        state = self.lifecycle.state().as_str(),
                        "RoomActor received cancellation signal"
                    );
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
                                target: "notifier.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }

                () = sleep_until_deadline(deadline) => {
                    self.handle_cooldown_elapsed().await;
                }
            }
        }

        info!(
            target: "notifier.actor.room",
            room_id = %self.room_id,
            state = self.lifecycle.state().as_str(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Event(event) => self.handle_event(event).await,
            RoomMessage::LinkDown => {
                if !self.lifecycle.is_frozen() {
                    self.lifecycle.freeze(Instant::now());
                    debug!(
                        target: "notifier.actor.room",
                        room_id = %self.room_id,
                        state = self.lifecycle.state().as_str(),
                        "Link down, lifecycle frozen"
                    );
                }
            }
            RoomMessage::LinkUp => {
                if self.lifecycle.is_frozen() {
                    let deadline = self.lifecycle.thaw(Instant::now());
                    debug!(
                        target: "notifier.actor.room",
                        room_id = %self.room_id,
                        state = self.lifecycle.state().as_str(),
                        cooldown_secs = deadline
                            .map(|until| until.saturating_duration_since(Instant::now()).as_secs()),
                        "Link up, lifecycle resumed"
                    );
                }
            }
            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    async fn handle_event(&mut self, event: RawEvent) {
        match event {
            RawEvent::Live { observed_at, .. } => self.handle_live(observed_at).await,
            RawEvent::Offline { .. } => self.handle_offline(),
            RawEvent::Gift { gift, .. } => self.handle_gift(gift).await,
            RawEvent::Disconnected { .. } | RawEvent::Malformed { .. } => {
                debug!(
                    target: "notifier.actor.room",
                    room_id = %self.room_id,
                    "Ignoring link-level event"
                );
            }
        }
    }

    async fn handle_live(&mut self, observed_at: DateTime<Utc>) {
        match self.lifecycle.on_live(Instant::now()) {
            LiveOutcome::Started => {
                self.start_session(observed_at).await;
            }
            LiveOutcome::Restarted { previous_duration } => {
                // The deadline had already passed; close the old session first.
                self.end_session(previous_duration).await;
                self.start_session(observed_at).await;
            }
            LiveOutcome::Resumed => {
                info!(
                    target: "notifier.actor.room",
                    room_id = %self.room_id,
                    "Live again within cooldown, offline suppressed"
                );
            }
            LiveOutcome::Ignored => {
                debug!(
                    target: "notifier.actor.room",
                    room_id = %self.room_id,
                    "Duplicate live event ignored"
                );
            }
        }
    }

    fn handle_offline(&mut self) {
        match self.lifecycle.on_offline(Instant::now()) {
            OfflineOutcome::CoolingDown { until } => {
                debug!(
                    target: "notifier.actor.room",
                    room_id = %self.room_id,
                    cooldown_secs = until.saturating_duration_since(Instant::now()).as_secs(),
                    "Offline observed, cooling down"
                );
            }
            OfflineOutcome::MarkedOffline => {
                debug!(
                    target: "notifier.actor.room",
                    room_id = %self.room_id,
                    "Room offline before any live observation"
                );
            }
            OfflineOutcome::Ignored => {}
        }
    }

    async fn handle_gift(&mut self, gift: GiftEvent) {
        debug!(
            target: "notifier.actor.room",
            room_id = %self.room_id,
            gift_id = %gift.gift_id,
            count = gift.count,
            "Gift received"
        );
        self.emit(Notification::gift(self.room_id, gift)).await;
    }

    async fn handle_cooldown_elapsed(&mut self) {
        match self.lifecycle.on_cooldown_elapsed(Instant::now()) {
            ExpiryOutcome::Ended { duration } => self.end_session(duration).await,
            ExpiryOutcome::NotDue | ExpiryOutcome::Ignored => {}
        }
    }

    async fn start_session(&mut self, started_at: DateTime<Utc>) {
        self.live_started_at = Some(started_at);
        info!(
            target: "notifier.actor.room",
            room_id = %self.room_id,
            "Live session started"
        );
        self.emit(Notification::live_start(self.room_id, started_at))
            .await;
    }

    async fn end_session(&mut self, duration: Duration) {
        self.live_started_at = None;
        prom::record_session_duration(duration);
        info!(
            target: "notifier.actor.room",
            room_id = %self.room_id,
            duration_secs = duration.as_secs(),
            "Live session ended"
        );
        self.emit(Notification::live_end(self.room_id, duration, Utc::now()))
            .await;
    }

    async fn emit(&self, notification: Notification) {
        let kind = notification.kind.as_str();
        if self.notify_tx.send(notification).await.is_err() {
            warn!(
                target: "notifier.actor.room",
                room_id = %self.room_id,
                kind,
                "Dispatcher queue closed, notification dropped"
            );
            return;
        }
        prom::record_notification_emitted(kind);
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id,
            state: self.lifecycle.state(),
            live_since: self.live_started_at,
            cooldown_remaining: self.lifecycle.cooldown_remaining(Instant::now()),
            frozen: self.lifecycle.is_frozen(),
        }
    }
}

/// Resolves at `deadline`, or never when there is none.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;
    use crate::notification::NotificationKind;

    const ROOM: RoomId = RoomId(12_725_169);
    const COOLDOWN: Duration = Duration::from_secs(10);

    fn spawn_room() -> (RoomActorHandle, mpsc::Receiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::channel(16);
        let (handle, _task) = RoomActor::spawn(
            ROOM,
            COOLDOWN,
            CancellationToken::new(),
            notify_tx,
            ActorMetrics::new(),
        );
        (handle, notify_rx)
    }

    fn live() -> RawEvent {
        RawEvent::Live {
            room_id: ROOM,
            observed_at: Utc::now(),
        }
    }

    fn offline() -> RawEvent {
        RawEvent::Offline {
            room_id: ROOM,
            observed_at: Utc::now(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_emits_single_start() {
        let (handle, mut rx) = spawn_room();

        handle.deliver(live()).await.unwrap();
        handle.deliver(live()).await.unwrap();
        settle().await;

        let first = rx.try_recv().unwrap();
        assert!(matches!(first.kind, NotificationKind::LiveStart { .. }));
        assert!(rx.try_recv().is_err());

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.state, LifecycleState::Live);
        assert!(state.live_since.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flap_within_cooldown_is_silent() {
        let (handle, mut rx) = spawn_room();
        handle.deliver(live()).await.unwrap();
        settle().await;
        let _start = rx.try_recv().unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        handle.deliver(offline()).await.unwrap();
        settle().await;
        assert_eq!(
            handle.get_state().await.unwrap().state,
            LifecycleState::CoolingDown
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        handle.deliver(live()).await.unwrap();
        settle().await;

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;

        assert!(rx.try_recv().is_err());
        assert_eq!(handle.get_state().await.unwrap().state, LifecycleState::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expiry_emits_one_end() {
        let (handle, mut rx) = spawn_room();
        handle.deliver(live()).await.unwrap();
        settle().await;
        let _start = rx.try_recv().unwrap();

        tokio::time::advance(Duration::from_secs(590)).await;
        handle.deliver(offline()).await.unwrap();
        settle().await;

        tokio::time::advance(COOLDOWN).await;
        settle().await;

        let end = rx.try_recv().unwrap();
        match end.kind {
            NotificationKind::LiveEnd { duration, .. } => {
                assert_eq!(duration.as_secs(), 600);
            }
            other => panic!("expected live end, got {other:?}"),
        }

        // Further offline events do not end the session twice.
        handle.deliver(offline()).await.unwrap();
        tokio::time::advance(COOLDOWN * 2).await;
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(
            handle.get_state().await.unwrap().state,
            LifecycleState::Offline
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gift_forwarded_in_any_state() {
        let (handle, mut rx) = spawn_room();

        handle
            .deliver(RawEvent::Gift {
                room_id: ROOM,
                gift: GiftEvent {
                    gift_id: "196".to_string(),
                    sender: "viewer".to_string(),
                    count: 1,
                    timestamp: Utc::now(),
                },
            })
            .await
            .unwrap();
        settle().await;

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.room_id, ROOM);
        assert!(matches!(notification.kind, NotificationKind::Gift(_)));
        assert_eq!(
            handle.get_state().await.unwrap().state,
            LifecycleState::Unknown
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_end() {
        let (handle, mut rx) = spawn_room();
        handle.deliver(live()).await.unwrap();
        handle.deliver(offline()).await.unwrap();
        settle().await;
        let _start = rx.try_recv().unwrap();

        handle.cancel();
        tokio::time::advance(COOLDOWN * 2).await;
        settle().await;

        assert!(handle.is_cancelled());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_outage_freezes_cooldown() {
        let (handle, mut rx) = spawn_room();
        handle.deliver(live()).await.unwrap();
        settle().await;
        let _start = rx.try_recv().unwrap();

        handle.deliver(offline()).await.unwrap();
        settle().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        handle.set_link_up(false).await.unwrap();
        settle().await;

        // Outage longer than the cooldown.
        tokio::time::advance(COOLDOWN * 3).await;
        settle().await;
        assert!(rx.try_recv().is_err());
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.state, LifecycleState::CoolingDown);
        assert!(state.frozen);
        let remaining = state.cooldown_remaining.unwrap();
        assert!(remaining > Duration::from_secs(8) && remaining <= Duration::from_secs(9));

        handle.set_link_up(true).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        handle.deliver(live()).await.unwrap();
        tokio::time::advance(COOLDOWN * 3).await;
        settle().await;

        assert!(rx.try_recv().is_err(), "no spurious end or second start");
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.state, LifecycleState::Live);
        assert!(!state.frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_resumes_after_reconnect() {
        let (handle, mut rx) = spawn_room();
        handle.deliver(live()).await.unwrap();
        handle.deliver(offline()).await.unwrap();
        settle().await;
        let _start = rx.try_recv().unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        handle.set_link_up(false).await.unwrap();
        settle().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        handle.set_link_up(true).await.unwrap();
        settle().await;

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        let end = rx.try_recv().unwrap();
        assert!(matches!(end.kind, NotificationKind::LiveEnd { .. }));
    }
}
