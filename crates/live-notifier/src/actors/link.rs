//! Link worker - keeps one room's stream link open.
//!
//! Each worker iteration connects, pumps events to the supervisor, and ends
//! in a [`LinkOutcome`]. `Closed` and `Failed` schedule a reconnect after the
//! fixed delay; `Stopped` ends the worker. A failing link never reports the
//! room offline: the room's lifecycle is left exactly as it was.

use super::messages::LinkReport;
use crate::clients::{RawEvent, StreamClient, StreamLink};
use crate::observability::metrics as prom;
use chrono::Utc;
use common::types::RoomId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How one connection attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The remote side closed the link.
    Closed,
    /// Connecting failed, the link dropped, or the stream sent garbage.
    Failed(String),
    /// Cancellation was requested.
    Stopped,
}

/// Worker that owns the link for one room.
pub struct LinkWorker {
    room_id: RoomId,
    /// Distinguishes this worker's reports from a restarted predecessor's.
    generation: u64,
    client: Arc<dyn StreamClient>,
    report_tx: mpsc::Sender<LinkReport>,
    reconnect_delay: Duration,
    cancel_token: CancellationToken,
    /// Whether the initial status check already ran.
    status_checked: bool,
}

impl LinkWorker {
    /// Spawn a link worker.
    pub fn spawn(
        room_id: RoomId,
        generation: u64,
        client: Arc<dyn StreamClient>,
        report_tx: mpsc::Sender<LinkReport>,
        reconnect_delay: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let worker = Self {
            room_id,
            generation,
            client,
            report_tx,
            reconnect_delay,
            cancel_token,
            status_checked: false,
        };
        tokio::spawn(worker.run())
    }

    #[instrument(
        skip_all,
        name = "notifier.link",
        fields(room_id = %self.room_id, generation = self.generation)
    )]
    async fn run(mut self) {
        debug!(
            target: "notifier.link",
            room_id = %self.room_id,
            generation = self.generation,
            "Link worker started"
        );

        loop {
            let reason = match self.connect_and_pump().await {
                LinkOutcome::Stopped => break,
                LinkOutcome::Closed => "closed by remote".to_string(),
                LinkOutcome::Failed(reason) => reason,
            };

            warn!(
                target: "notifier.link",
                room_id = %self.room_id,
                reason = %reason,
                delay_secs = self.reconnect_delay.as_secs(),
                "Link down, reconnecting after delay"
            );
            self.report(LinkReport::Down {
                room_id: self.room_id,
                generation: self.generation,
                reason,
            })
            .await;

            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {
                    prom::record_link_reconnect();
                }
            }
        }

        debug!(
            target: "notifier.link",
            room_id = %self.room_id,
            generation = self.generation,
            "Link worker stopped"
        );
    }

    /// One connection attempt, from connect until the link ends.
    async fn connect_and_pump(&mut self) -> LinkOutcome {
        let connected = tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => return LinkOutcome::Stopped,
            result = self.client.connect(self.room_id) => result,
        };
        let mut link = match connected {
            Ok(link) => link,
            Err(e) => return LinkOutcome::Failed(e.to_string()),
        };

        info!(
            target: "notifier.link",
            room_id = %self.room_id,
            "Link connected"
        );
        self.report(LinkReport::Connected {
            room_id: self.room_id,
            generation: self.generation,
        })
        .await;

        if !self.status_checked {
            self.status_checked = true;
            self.check_status().await;
        }

        let outcome = self.pump(link.as_mut()).await;
        if outcome != LinkOutcome::Closed {
            link.close().await;
        }
        outcome
    }

    async fn pump(&mut self, link: &mut dyn StreamLink) -> LinkOutcome {
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => return LinkOutcome::Stopped,
                event = link.next_event() => event,
            };

            match event {
                None => return LinkOutcome::Closed,
                Some(RawEvent::Disconnected { reason }) => return LinkOutcome::Failed(reason),
                Some(RawEvent::Malformed { detail }) => {
                    warn!(
                        target: "notifier.link",
                        room_id = %self.room_id,
                        detail = %detail,
                        "Malformed event from stream, resetting link"
                    );
                    prom::record_protocol_error();
                    return LinkOutcome::Failed(format!("protocol error: {detail}"));
                }
                Some(event) => {
                    let report = LinkReport::Event {
                        generation: self.generation,
                        event,
                    };
                    if self.report_tx.send(report).await.is_err() {
                        return LinkOutcome::Stopped;
                    }
                }
            }
        }
    }

    /// Announce a room that is already live when first connected.
    async fn check_status(&self) {
        match self.client.check_live(self.room_id).await {
            Ok(true) => {
                debug!(
                    target: "notifier.link",
                    room_id = %self.room_id,
                    "Room already live at first connect"
                );
                self.report(LinkReport::Event {
                    generation: self.generation,
                    event: RawEvent::Live {
                        room_id: self.room_id,
                        observed_at: Utc::now(),
                    },
                })
                .await;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    target: "notifier.link",
                    room_id = %self.room_id,
                    error = %e,
                    "Initial status check failed"
                );
            }
        }
    }

    async fn report(&self, report: LinkReport) {
        if self.report_tx.send(report).await.is_err() {
            debug!(
                target: "notifier.link",
                room_id = %self.room_id,
                "Supervisor gone, report dropped"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::errors::StreamError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const ROOM: RoomId = RoomId(12_725_169);
    const DELAY: Duration = Duration::from_secs(10);

    struct QueueLink(mpsc::Receiver<RawEvent>);

    #[async_trait]
    impl StreamLink for QueueLink {
        async fn next_event(&mut self) -> Option<RawEvent> {
            self.0.recv().await
        }

        async fn close(&mut self) {
            self.0.close();
        }
    }

    /// Hands out one prepared link per successful connect; fails when empty.
    struct QueueClient {
        links: Mutex<VecDeque<mpsc::Receiver<RawEvent>>>,
        connects: AtomicUsize,
        live: bool,
    }

    impl QueueClient {
        fn new(live: bool) -> Self {
            Self {
                links: Mutex::new(VecDeque::new()),
                connects: AtomicUsize::new(0),
                live,
            }
        }

        fn push_link(&self) -> mpsc::Sender<RawEvent> {
            let (tx, rx) = mpsc::channel(16);
            self.links.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl StreamClient for QueueClient {
        async fn connect(&self, _room_id: RoomId) -> Result<Box<dyn StreamLink>, StreamError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.links.lock().unwrap().pop_front() {
                Some(rx) => Ok(Box::new(QueueLink(rx))),
                None => Err(StreamError::Connect("refused".to_string())),
            }
        }

        async fn check_live(&self, _room_id: RoomId) -> Result<bool, StreamError> {
            Ok(self.live)
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_check_synthesizes_live_once() {
        let client = Arc::new(QueueClient::new(true));
        let events = client.push_link();
        let (report_tx, mut report_rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let _task = LinkWorker::spawn(ROOM, 1, client.clone(), report_tx, DELAY, token.clone());
        settle().await;

        assert!(matches!(
            report_rx.try_recv().unwrap(),
            LinkReport::Connected { generation: 1, .. }
        ));
        assert!(matches!(
            report_rx.try_recv().unwrap(),
            LinkReport::Event {
                generation: 1,
                event: RawEvent::Live { room_id, .. },
            } if room_id == ROOM
        ));

        events
            .send(RawEvent::Offline {
                room_id: ROOM,
                observed_at: Utc::now(),
            })
            .await
            .unwrap();
        settle().await;
        assert!(matches!(
            report_rx.try_recv().unwrap(),
            LinkReport::Event {
                generation: 1,
                event: RawEvent::Offline { .. },
            }
        ));

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_link_reconnects_after_delay() {
        let client = Arc::new(QueueClient::new(false));
        let first = client.push_link();
        let _second = client.push_link();
        let (report_tx, mut report_rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let _task = LinkWorker::spawn(ROOM, 1, client.clone(), report_tx, DELAY, token.clone());
        settle().await;
        assert!(matches!(
            report_rx.try_recv().unwrap(),
            LinkReport::Connected { .. }
        ));

        first
            .send(RawEvent::Disconnected {
                reason: "reset".to_string(),
            })
            .await
            .unwrap();
        settle().await;
        match report_rx.try_recv().unwrap() {
            LinkReport::Down { reason, .. } => assert_eq!(reason, "reset"),
            other => panic!("expected down report, got {other:?}"),
        }
        assert_eq!(client.connects.load(Ordering::SeqCst), 1);

        tokio::time::advance(DELAY / 2).await;
        settle().await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 1);

        tokio::time::advance(DELAY).await;
        settle().await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 2);
        assert!(matches!(
            report_rx.try_recv().unwrap(),
            LinkReport::Connected { .. }
        ));

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_event_resets_link() {
        let client = Arc::new(QueueClient::new(false));
        let events = client.push_link();
        let (report_tx, mut report_rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let _task = LinkWorker::spawn(ROOM, 3, client, report_tx, DELAY, token.clone());
        settle().await;
        let _connected = report_rx.try_recv().unwrap();

        events
            .send(RawEvent::Malformed {
                detail: "bad frame".to_string(),
            })
            .await
            .unwrap();
        settle().await;

        match report_rx.try_recv().unwrap() {
            LinkReport::Down {
                generation, reason, ..
            } => {
                assert_eq!(generation, 3);
                assert!(reason.contains("bad frame"));
            }
            other => panic!("expected down report, got {other:?}"),
        }

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_pending_reconnect() {
        let client = Arc::new(QueueClient::new(false));
        let (report_tx, mut report_rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let task = LinkWorker::spawn(ROOM, 1, client.clone(), report_tx, DELAY, token.clone());
        settle().await;
        assert!(matches!(
            report_rx.try_recv().unwrap(),
            LinkReport::Down { .. }
        ));

        token.cancel();
        task.await.unwrap();
        assert_eq!(client.connects.load(Ordering::SeqCst), 1);
    }
}
