//! Room info lookup over the public room API (`GET {base}/{room_id}`).
//!
//! Used as the [`NameResolver`] for `add` and as the status check behind
//! [`super::GatewayStreamClient::check_live`].

use super::NameResolver;
use crate::errors::{NotifierError, ResolveError};
use async_trait::async_trait;
use common::types::RoomId;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{instrument, warn};

/// Request timeout for room lookups.
const ROOM_API_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct RoomInfoResponse {
    #[serde(default)]
    room: Option<RoomPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct RoomPayload {
    #[serde(default)]
    owner_name: String,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    room_name: String,
    #[serde(default)]
    show_status: Value,
    #[serde(default, rename = "videoLoop")]
    video_loop: Value,
}

impl RoomPayload {
    fn display_name(&self) -> Option<&str> {
        [&self.owner_name, &self.nickname, &self.room_name]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }

    /// Broadcasting, and not a replay loop.
    fn is_live(&self) -> bool {
        as_int(&self.show_status) == Some(1) && as_int(&self.video_loop) != Some(1)
    }
}

/// The API mixes numeric and string encodings for status fields.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// HTTP client for the room info endpoint.
#[derive(Clone)]
pub struct RoomApiClient {
    client: Client,
    base_url: String,
}

impl RoomApiClient {
    /// Create a new room API client.
    ///
    /// # Errors
    ///
    /// Returns `NotifierError::Config` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(ROOM_API_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| NotifierError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Whether the room is broadcasting right now.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown rooms, `Unavailable` for transport failures.
    pub async fn is_live(&self, room_id: RoomId) -> Result<bool, ResolveError> {
        self.fetch(room_id).await.map(|room| room.is_live())
    }

    #[instrument(skip(self), fields(room_id = %room_id))]
    async fn fetch(&self, room_id: RoomId) -> Result<RoomPayload, ResolveError> {
        let url = format!("{}/{room_id}", self.base_url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(target: "notifier.room_api", error = %e, "Room API request failed");
            ResolveError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ResolveError::NotFound);
        }
        if !status.is_success() {
            warn!(target: "notifier.room_api", status = %status, "Room API returned error");
            return Err(ResolveError::Unavailable(format!("status {status}")));
        }

        let body: RoomInfoResponse = response.json().await.map_err(|e| {
            warn!(target: "notifier.room_api", error = %e, "Failed to parse room API response");
            ResolveError::Unavailable(e.to_string())
        })?;

        body.room.ok_or(ResolveError::NotFound)
    }
}

#[async_trait]
impl NameResolver for RoomApiClient {
    async fn resolve_name(&self, room_id: RoomId) -> Result<String, ResolveError> {
        let room = self.fetch(room_id).await?;
        room.display_name()
            .map(ToString::to_string)
            .ok_or(ResolveError::NotFound)
    }
}
