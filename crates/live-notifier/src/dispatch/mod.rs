//! Notification dispatch.
//!
//! Room actors publish [`Notification`]s into the dispatch queue. The queue
//! starts one dispatch task per notification; tasks for the same room are
//! chained, each waiting for its predecessor's completion signal, so a room's
//! live-start is fully sent (or abandoned) before its live-end starts.
//! Different rooms proceed independently.
//!
//! Every dispatch task lives in one `JoinSet`. On shutdown the queue stops
//! accepting notifications, gives the set a bounded grace period, then aborts
//! whatever is left and waits for the aborted tasks to unwind.

pub mod dispatcher;
pub mod retry;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use retry::{NextStep, RetryPolicy, SendAttempt};

use crate::actors::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::notification::Notification;
use common::types::RoomId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the dispatch queue.
const DISPATCH_CHANNEL_BUFFER: usize = 1000;

/// Handle to the dispatch queue.
#[derive(Clone)]
pub struct NotificationDispatcherHandle {
    sender: mpsc::Sender<Notification>,
    cancel_token: CancellationToken,
}

impl NotificationDispatcherHandle {
    /// Sender that room actors publish notifications to.
    #[must_use]
    pub fn notifier(&self) -> mpsc::Sender<Notification> {
        self.sender.clone()
    }

    /// Stop accepting notifications and drain in-flight dispatches.
    ///
    /// Await the queue's `JoinHandle` to wait for the drain to finish.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Queue that orders dispatches per room.
pub struct DispatchQueue {
    receiver: mpsc::Receiver<Notification>,
    dispatcher: Arc<NotificationDispatcher>,
    cancel_token: CancellationToken,
    /// Completion signal of the most recent dispatch per room. Closed once
    /// that dispatch finishes or is aborted.
    tails: HashMap<RoomId, oneshot::Receiver<()>>,
    /// Every dispatch task still running.
    in_flight: JoinSet<()>,
    /// How long in-flight dispatches may run after shutdown.
    grace_period: Duration,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl DispatchQueue {
    /// Spawn the dispatch queue.
    pub fn spawn(
        dispatcher: NotificationDispatcher,
        grace_period: Duration,
        metrics: Arc<ActorMetrics>,
    ) -> (NotificationDispatcherHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(DISPATCH_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let queue = Self {
            receiver,
            dispatcher: Arc::new(dispatcher),
            cancel_token: cancel_token.clone(),
            tails: HashMap::new(),
            in_flight: JoinSet::new(),
            grace_period,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Dispatcher, "dispatcher"),
        };

        let task_handle = tokio::spawn(queue.run());

        (
            NotificationDispatcherHandle {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }

    #[instrument(skip_all, name = "notifier.dispatch.queue")]
    async fn run(mut self) {
        info!(target: "notifier.dispatch", "Dispatch queue started");

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "notifier.dispatch",
                        "Dispatch queue received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(notification) => {
                            self.mailbox.record_receive(self.receiver.len());
                            self.enqueue(notification);
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "notifier.dispatch",
                                "Dispatch queue channel closed, draining"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.drain().await;

        info!(
            target: "notifier.dispatch",
            messages_processed = self.mailbox.messages_processed(),
            "Dispatch queue stopped"
        );
    }

    /// Start dispatching `notification` after the room's previous dispatch.
    fn enqueue(&mut self, notification: Notification) {
        while self.in_flight.try_join_next().is_some() {}
        self.tails
            .retain(|_, done| matches!(done.try_recv(), Err(TryRecvError::Empty)));

        let room_id = notification.room_id;
        let previous = self.tails.remove(&room_id);
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let dispatcher = Arc::clone(&self.dispatcher);

        self.in_flight.spawn(async move {
            let _done = done_tx;
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            dispatcher.dispatch(&notification).await;
        });
        self.tails.insert(room_id, done_rx);

        debug!(
            target: "notifier.dispatch",
            room_id = %room_id,
            in_flight = self.in_flight.len(),
            "Notification queued"
        );
    }

    /// Refuse new notifications and let in-flight work finish within the grace period.
    async fn drain(&mut self) {
        self.receiver.close();
        while let Ok(notification) = self.receiver.try_recv() {
            self.enqueue(notification);
        }
        self.tails.clear();

        let pending = self.in_flight.len();
        if pending == 0 {
            return;
        }

        let in_flight = &mut self.in_flight;
        let finished = tokio::time::timeout(self.grace_period, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        match finished {
            Ok(()) => {
                info!(
                    target: "notifier.dispatch",
                    dispatches = pending,
                    "In-flight dispatches drained"
                );
            }
            Err(_) => {
                warn!(
                    target: "notifier.dispatch",
                    dispatches = self.in_flight.len(),
                    grace_secs = self.grace_period.as_secs(),
                    "Grace period elapsed, aborting in-flight dispatches"
                );
                self.in_flight.abort_all();
                while self.in_flight.join_next().await.is_some() {}
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clients::MessageSender;
    use crate::errors::SendError;
    use crate::gifts::GiftCatalog;
    use crate::persistence::PersistenceManager;
    use crate::registry::model::{RegistrySnapshot, RoomInfo, SubscriptionConfig};
    use crate::registry::SubscriptionRegistry;
    use async_trait::async_trait;
    use chrono::Utc;
    use common::types::DestinationId;
    use std::sync::Mutex;

    /// Takes `delay` per send and records message bodies in completion order.
    struct SlowSender {
        delay: Duration,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageSender for SlowSender {
        async fn send(
            &self,
            _destination: &DestinationId,
            message: &str,
            _wants_mass_mention: bool,
        ) -> Result<(), SendError> {
            tokio::time::sleep(self.delay).await;
            self.sent.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn queue_with(
        delay: Duration,
        grace: Duration,
    ) -> (NotificationDispatcherHandle, JoinHandle<()>, Arc<SlowSender>) {
        let mut snapshot = RegistrySnapshot::default();
        for room in [RoomId(1), RoomId(2)] {
            snapshot.room_info.insert(
                room,
                RoomInfo {
                    name: format!("Streamer {room}"),
                    added_by: "admin".to_string(),
                    added_time: String::new(),
                },
            );
            snapshot.subscriptions.insert(
                room,
                [(DestinationId::new("A").unwrap(), SubscriptionConfig::default())]
                    .into_iter()
                    .collect(),
            );
        }
        let registry = Arc::new(SubscriptionRegistry::from_snapshot(
            snapshot,
            PersistenceManager::new(std::env::temp_dir().join("dispatch-queue-unused.json")),
        ));
        let sender = Arc::new(SlowSender {
            delay,
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::new(
            registry,
            sender.clone(),
            RetryPolicy::default(),
            GiftCatalog::default(),
            8,
        );
        let (handle, task) = DispatchQueue::spawn(dispatcher, grace, ActorMetrics::new());
        (handle, task, sender)
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_room_dispatches_in_order() {
        let (handle, task, sender) =
            queue_with(Duration::from_secs(1), Duration::from_secs(30));
        let notifier = handle.notifier();

        notifier
            .send(Notification::live_start(RoomId(1), Utc::now()))
            .await
            .unwrap();
        notifier
            .send(Notification::live_end(
                RoomId(1),
                Duration::from_secs(60),
                Utc::now(),
            ))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        let sent = sender.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent.first().unwrap().starts_with("Live now"));
        assert!(sent.last().unwrap().starts_with("Stream ended"));

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rooms_dispatch_independently() {
        let (handle, task, sender) =
            queue_with(Duration::from_secs(1), Duration::from_secs(30));
        let notifier = handle.notifier();

        notifier
            .send(Notification::live_start(RoomId(1), Utc::now()))
            .await
            .unwrap();
        notifier
            .send(Notification::live_start(RoomId(2), Utc::now()))
            .await
            .unwrap();

        // Both rooms finish within one send delay.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(sender.sent.lock().unwrap().len(), 2);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_sends() {
        let (handle, task, sender) =
            queue_with(Duration::from_secs(3), Duration::from_secs(10));

        handle
            .notifier()
            .send(Notification::live_start(RoomId(1), Utc::now()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.shutdown();
        task.await.unwrap();
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_after_grace_period() {
        let (handle, task, sender) =
            queue_with(Duration::from_secs(60), Duration::from_secs(1));

        handle
            .notifier()
            .send(Notification::live_start(RoomId(1), Utc::now()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.shutdown();
        task.await.unwrap();
        assert!(handle.is_cancelled());
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_bounds_every_queued_dispatch() {
        let (handle, task, sender) =
            queue_with(Duration::from_secs(60), Duration::from_secs(1));
        let notifier = handle.notifier();

        notifier
            .send(Notification::live_start(RoomId(1), Utc::now()))
            .await
            .unwrap();
        notifier
            .send(Notification::live_end(
                RoomId(1),
                Duration::from_secs(60),
                Utc::now(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.shutdown();
        task.await.unwrap();

        // Neither the chained dispatch nor its predecessor survives the drain.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(sender.sent.lock().unwrap().is_empty());
    }
}
