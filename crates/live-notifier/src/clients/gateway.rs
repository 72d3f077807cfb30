//! Stream gateway client: one WebSocket per room, JSON text frames.
//!
//! The gateway speaks the streaming service's wire protocol on our behalf
//! and forwards room events as frames such as:
//!
//! ```json
//! {"type": "live"}
//! {"type": "offline", "room_id": 12725169}
//! {"type": "gift", "gift_id": "196", "sender": "viewer", "count": 2}
//! {"type": "heartbeat"}
//! ```
//!
//! Gift frames also accept the upstream field names (`gfid`, `nn`, `gfcnt`,
//! `hits`). Frames that do not parse become [`RawEvent::Malformed`].

use super::room_api::RoomApiClient;
use super::{RawEvent, StreamClient, StreamLink};
use crate::errors::StreamError;
use crate::notification::GiftEvent;
use async_trait::async_trait;
use chrono::Utc;
use common::types::RoomId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

type GatewaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GatewayFrame {
    Live {
        #[serde(default)]
        room_id: Option<u64>,
    },
    Offline {
        #[serde(default)]
        room_id: Option<u64>,
    },
    Gift {
        #[serde(default)]
        room_id: Option<u64>,
        #[serde(alias = "gfid")]
        gift_id: Value,
        #[serde(default, alias = "nn")]
        sender: String,
        #[serde(default, alias = "gfcnt", alias = "hits")]
        count: Value,
    },
    Heartbeat,
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Gift batch size; anything missing or unusable counts as one.
fn gift_count(value: &Value) -> u32 {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Interpret one text frame received on `room_id`'s link.
///
/// Returns `None` for frames that carry no event (heartbeats).
pub(crate) fn parse_frame(room_id: RoomId, text: &str) -> Option<RawEvent> {
    let frame: GatewayFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(RawEvent::Malformed {
                detail: e.to_string(),
            })
        }
    };
    let observed_at = Utc::now();

    match frame {
        GatewayFrame::Live { room_id: id } => Some(RawEvent::Live {
            room_id: id.map_or(room_id, RoomId),
            observed_at,
        }),
        GatewayFrame::Offline { room_id: id } => Some(RawEvent::Offline {
            room_id: id.map_or(room_id, RoomId),
            observed_at,
        }),
        GatewayFrame::Gift {
            room_id: id,
            gift_id,
            sender,
            count,
        } => {
            let Some(gift_id) = id_string(&gift_id) else {
                return Some(RawEvent::Malformed {
                    detail: format!("gift frame without usable gift id: {gift_id}"),
                });
            };
            Some(RawEvent::Gift {
                room_id: id.map_or(room_id, RoomId),
                gift: GiftEvent {
                    gift_id,
                    sender,
                    count: gift_count(&count),
                    timestamp: observed_at,
                },
            })
        }
        GatewayFrame::Heartbeat => None,
    }
}

/// An open gateway socket for one room.
pub struct GatewayLink {
    room_id: RoomId,
    socket: GatewaySocket,
}

#[async_trait]
impl StreamLink for GatewayLink {
    async fn next_event(&mut self) -> Option<RawEvent> {
        loop {
            let message = match self.socket.next().await {
                None => return None,
                Some(Err(e)) => {
                    return Some(RawEvent::Disconnected {
                        reason: e.to_string(),
                    })
                }
                Some(Ok(message)) => message,
            };

            match message {
                Message::Text(text) => {
                    if let Some(event) = parse_frame(self.room_id, &text) {
                        return Some(event);
                    }
                }
                Message::Binary(_) => {
                    return Some(RawEvent::Malformed {
                        detail: "unexpected binary frame".to_string(),
                    })
                }
                Message::Ping(payload) => {
                    let _ = self.socket.send(Message::Pong(payload)).await;
                }
                Message::Close(frame) => {
                    debug!(
                        target: "notifier.link",
                        room_id = %self.room_id,
                        frame = ?frame,
                        "Gateway closed the link"
                    );
                    return None;
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.socket.close(None).await;
    }
}

/// Stream client backed by the gateway, with status checks from the room API.
#[derive(Clone)]
pub struct GatewayStreamClient {
    base_url: String,
    room_api: RoomApiClient,
}

impl GatewayStreamClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, room_api: RoomApiClient) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            room_api,
        }
    }

    fn room_url(&self, room_id: RoomId) -> String {
        format!("{}/rooms/{room_id}", self.base_url)
    }
}

#[async_trait]
impl StreamClient for GatewayStreamClient {
    #[instrument(skip(self), fields(room_id = %room_id))]
    async fn connect(&self, room_id: RoomId) -> Result<Box<dyn StreamLink>, StreamError> {
        let (socket, _response) = tokio_tungstenite::connect_async(self.room_url(room_id))
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        Ok(Box::new(GatewayLink { room_id, socket }))
    }

    async fn check_live(&self, room_id: RoomId) -> Result<bool, StreamError> {
        self.room_api
            .is_live(room_id)
            .await
            .map_err(|e| StreamError::StatusCheck(e.to_string()))
    }
}
