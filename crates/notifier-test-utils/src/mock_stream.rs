//! Mock stream client.
//!
//! Every `connect` opens a fresh channel-backed link for the room. Tests push
//! events into the room's current link, drop it to simulate a closed socket,
//! or script connect failures.
//!
//! # Example
//!
//! ```rust,ignore
//! let stream = MockStreamClient::new();
//! stream.wait_for_connects(RoomId(1), 1).await;
//! stream.emit(RoomId(1), live(1)).await;
//! stream.drop_link(RoomId(1));
//! ```

use async_trait::async_trait;
use common::types::RoomId;
use live_notifier::clients::{RawEvent, StreamClient, StreamLink};
use live_notifier::errors::StreamError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct RoomScript {
    current: Option<mpsc::UnboundedSender<RawEvent>>,
    connects: usize,
    closes: usize,
    failures_left: usize,
    live: bool,
}

/// Scripted `StreamClient`.
#[derive(Clone, Default)]
pub struct MockStreamClient {
    rooms: Arc<Mutex<HashMap<RoomId, RoomScript>>>,
}

impl MockStreamClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connects for `room_id` fail.
    pub fn fail_connects(&self, room_id: RoomId, count: usize) {
        self.rooms.lock().unwrap().entry(room_id).or_default().failures_left = count;
    }

    /// Set what the status check reports for `room_id`.
    pub fn set_live(&self, room_id: RoomId, live: bool) {
        self.rooms.lock().unwrap().entry(room_id).or_default().live = live;
    }

    /// Push an event into the room's current link. Returns false if no link is open.
    pub async fn emit(&self, room_id: RoomId, event: RawEvent) -> bool {
        let sent = self
            .rooms
            .lock()
            .unwrap()
            .get(&room_id)
            .and_then(|room| room.current.as_ref())
            .is_some_and(|tx| tx.send(event).is_ok());
        // Let the link worker, supervisor and room actor pick it up
        settle().await;
        sent
    }

    /// Close the room's current link as the remote end would.
    pub fn drop_link(&self, room_id: RoomId) {
        if let Some(room) = self.rooms.lock().unwrap().get_mut(&room_id) {
            room.current = None;
        }
    }

    /// Number of successful connects for `room_id`.
    #[must_use]
    pub fn connects(&self, room_id: RoomId) -> usize {
        self.rooms
            .lock()
            .unwrap()
            .get(&room_id)
            .map_or(0, |room| room.connects)
    }

    /// Number of links for `room_id` closed by the notifier.
    #[must_use]
    pub fn closes(&self, room_id: RoomId) -> usize {
        self.rooms
            .lock()
            .unwrap()
            .get(&room_id)
            .map_or(0, |room| room.closes)
    }

    /// Wait until `room_id` has been connected at least `count` times.
    ///
    /// # Panics
    ///
    /// Panics if that does not happen within 60 seconds of (possibly paused) time.
    pub async fn wait_for_connects(&self, room_id: RoomId, count: usize) {
        for _ in 0..6000 {
            if self.connects(room_id) >= count {
                settle().await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "room {room_id} connected {} times, expected {count}",
            self.connects(room_id)
        );
    }
}

#[async_trait]
impl StreamClient for MockStreamClient {
    async fn connect(&self, room_id: RoomId) -> Result<Box<dyn StreamLink>, StreamError> {
        let mut rooms = self.rooms.lock().unwrap();
        let room = rooms.entry(room_id).or_default();
        if room.failures_left > 0 {
            room.failures_left -= 1;
            return Err(StreamError::Connect("scripted failure".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        room.current = Some(tx);
        room.connects += 1;
        Ok(Box::new(MockLink {
            room_id,
            rx,
            rooms: Arc::clone(&self.rooms),
        }))
    }

    async fn check_live(&self, room_id: RoomId) -> Result<bool, StreamError> {
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .get(&room_id)
            .is_some_and(|room| room.live))
    }
}

struct MockLink {
    room_id: RoomId,
    rx: mpsc::UnboundedReceiver<RawEvent>,
    rooms: Arc<Mutex<HashMap<RoomId, RoomScript>>>,
}

#[async_trait]
impl StreamLink for MockLink {
    async fn next_event(&mut self) -> Option<RawEvent> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
        if let Some(room) = self.rooms.lock().unwrap().get_mut(&self.room_id) {
            room.closes += 1;
        }
    }
}

/// Yield long enough for queued actor messages to be processed.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
