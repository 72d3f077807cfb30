//! Webhook delivery: `POST {url}` with `{destination, message, mass_mention}`.
//!
//! The receiving chat bridge owns platform specifics, including how the
//! mass-mention marker is rendered.

use super::MessageSender;
use crate::errors::{NotifierError, SendError};
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::DestinationId;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{instrument, warn};

/// Request timeout for a single delivery attempt.
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    destination: &'a str,
    message: &'a str,
    mass_mention: bool,
}

/// Sends rendered messages to a webhook endpoint.
#[derive(Clone)]
pub struct WebhookSender {
    client: Client,
    url: String,
    /// Bearer token, if the endpoint requires one.
    token: Option<SecretString>,
}

impl WebhookSender {
    /// Create a new webhook sender.
    ///
    /// # Errors
    ///
    /// Returns `NotifierError::Config` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, token: Option<SecretString>) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| NotifierError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl MessageSender for WebhookSender {
    #[instrument(skip_all, fields(mass_mention = wants_mass_mention))]
    async fn send(
        &self,
        destination: &DestinationId,
        message: &str,
        wants_mass_mention: bool,
    ) -> Result<(), SendError> {
        let payload = WebhookPayload {
            destination: destination.as_str(),
            message,
            mass_mention: wants_mass_mention,
        };

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            warn!(target: "notifier.webhook", error = %e, "Webhook request failed");
            SendError::Unreachable(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(SendError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }
}
