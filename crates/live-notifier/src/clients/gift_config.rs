//! Online gift names from the public gift config (`prop_gift_config.json`).
//!
//! The endpoint serves JSONP (`DYConfigCallback({"data": {"824": {"name": ...}}});`).
//! A successful fetch replaces the catalog's online names; a failed one leaves
//! the previous names (or the static table) in use.

use crate::errors::{GiftConfigError, NotifierError};
use crate::gifts::GiftCatalog;
use crate::observability::metrics as prom;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const JSONP_CALLBACK: &str = "DYConfigCallback(";

/// Request timeout for the gift config download.
const GIFT_CONFIG_TIMEOUT_SECS: u64 = 10;

/// HTTP client for the gift config.
#[derive(Clone)]
pub struct GiftConfigClient {
    client: Client,
    url: String,
}

impl GiftConfigClient {
    /// Create a new gift config client.
    ///
    /// # Errors
    ///
    /// Returns `NotifierError::Config` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(GIFT_CONFIG_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| NotifierError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Download the gift config and return its id to name mapping.
    ///
    /// # Errors
    ///
    /// `Unavailable` for transport failures and error statuses, `Malformed`
    /// if the body is not JSON, `Empty` if it names no gifts.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_names(&self) -> Result<HashMap<String, String>, GiftConfigError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| GiftConfigError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GiftConfigError::Unavailable(format!("status {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GiftConfigError::Unavailable(e.to_string()))?;

        let json = strip_jsonp(&body);
        if json.is_empty() {
            return Err(GiftConfigError::Malformed("empty body".to_string()));
        }
        let value: Value =
            serde_json::from_str(json).map_err(|e| GiftConfigError::Malformed(e.to_string()))?;

        let names = parse_gift_names(&value);
        if names.is_empty() {
            return Err(GiftConfigError::Empty);
        }
        Ok(names)
    }

    /// Fetch and install the online names into `catalog`.
    ///
    /// Returns the number of names installed.
    ///
    /// # Errors
    ///
    /// Any `fetch_names` error; the catalog is left unchanged.
    pub async fn refresh(&self, catalog: &GiftCatalog) -> Result<usize, GiftConfigError> {
        let result = self.fetch_names().await;
        prom::record_gift_config_refresh(result.is_ok());

        let names = result?;
        let count = names.len();
        catalog.replace_online_names(names);
        prom::set_gift_names_cached(count);
        Ok(count)
    }
}

/// Refresh `catalog` now and then every `interval` until cancelled.
pub fn spawn_refresh(
    client: GiftConfigClient,
    catalog: GiftCatalog,
    interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            target: "notifier.gifts",
            interval_secs = interval.as_secs(),
            "Starting gift config refresh task"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                result = client.refresh(&catalog) => result,
            };
            match result {
                Ok(count) => info!(
                    target: "notifier.gifts",
                    gifts = count,
                    "Gift config refreshed"
                ),
                Err(e) => warn!(
                    target: "notifier.gifts",
                    error = %e,
                    cached = catalog.online_name_count(),
                    "Gift config refresh failed, keeping previous names"
                ),
            }
        }

        debug!(target: "notifier.gifts", "Gift config refresh stopped");
    })
}

/// Unwrap a JSONP payload. Plain JSON passes through unchanged.
fn strip_jsonp(payload: &str) -> &str {
    let mut body = payload.trim();
    if let Some(rest) = body.strip_prefix(JSONP_CALLBACK) {
        body = rest;
    }
    body = body.trim_end_matches(';').trim_end();

    if body.starts_with('{') {
        return body.strip_suffix(')').map_or(body, str::trim_end);
    }

    // Some other callback name
    match (body.find('('), body.rfind(')')) {
        (Some(start), Some(end)) if end > start => {
            body.get(start + 1..end).map_or(body, str::trim)
        }
        _ => body,
    }
}

/// Entries without a usable name are skipped.
fn parse_gift_names(value: &Value) -> HashMap<String, String> {
    let Some(data) = value.get("data").and_then(Value::as_object) else {
        return HashMap::new();
    };

    data.iter()
        .filter_map(|(gift_id, info)| {
            let name = match info.get("name")? {
                Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((gift_id.clone(), name))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONFIG_PATH: &str = "/prop_gift_config.json";

    async fn server_with(template: ResponseTemplate) -> (MockServer, GiftConfigClient) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONFIG_PATH))
            .respond_with(template)
            .mount(&server)
            .await;
        let client = GiftConfigClient::new(format!("{}{CONFIG_PATH}", server.uri())).unwrap();
        (server, client)
    }

    #[test]
    fn test_strip_jsonp_variants() {
        assert_eq!(strip_jsonp(r#"DYConfigCallback({"a":1});"#), r#"{"a":1}"#);
        assert_eq!(strip_jsonp("  DYConfigCallback({\"a\":1})\n"), r#"{"a":1}"#);
        assert_eq!(strip_jsonp(r#"otherCallback( {"a":1} );"#), r#"{"a":1}"#);
        assert_eq!(
            strip_jsonp(r#"{"data":{"1":{"name":"Rocket (big)"}}}"#),
            r#"{"data":{"1":{"name":"Rocket (big)"}}}"#
        );
        assert_eq!(strip_jsonp("   "), "");
    }

    #[test]
    fn test_parse_skips_unnamed_entries() {
        let value = serde_json::json!({
            "data": {
                "824": {"name": "Glow Stick", "pc": 10},
                "1": {"name": ""},
                "2": {"pc": 5},
                "3": "not an object",
                "4": {"name": 404}
            }
        });
        let names = parse_gift_names(&value);
        assert_eq!(names.len(), 2);
        assert_eq!(names.get("824").unwrap(), "Glow Stick");
        assert_eq!(names.get("4").unwrap(), "404");
        assert!(parse_gift_names(&serde_json::json!({"other": {}})).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_installs_jsonp_names() {
        let (_server, client) = server_with(ResponseTemplate::new(200).set_body_string(
            r#"DYConfigCallback({"data":{"20000":{"name":"Fireworks"},"196":{"name":"Big Rocket"}}});"#,
        ))
        .await;
        let catalog = GiftCatalog::default();

        assert_eq!(client.refresh(&catalog).await.unwrap(), 2);
        assert_eq!(catalog.online_name_count(), 2);
        assert_eq!(catalog.classify("20000").name, "Fireworks");
        assert_eq!(catalog.classify("196").name, "Big Rocket");
        assert!(catalog.last_refreshed().is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_names() {
        let (_server, client) = server_with(ResponseTemplate::new(503)).await;
        let catalog = GiftCatalog::default();
        catalog.replace_online_names(HashMap::from([(
            "20000".to_string(),
            "Fireworks".to_string(),
        )]));

        assert!(matches!(
            client.refresh(&catalog).await,
            Err(GiftConfigError::Unavailable(_))
        ));
        assert_eq!(catalog.classify("20000").name, "Fireworks");
    }

    #[tokio::test]
    async fn test_malformed_and_empty_configs_are_rejected() {
        let (_server, client) =
            server_with(ResponseTemplate::new(200).set_body_string("DYConfigCallback(<html>);"))
                .await;
        assert!(matches!(
            client.fetch_names().await,
            Err(GiftConfigError::Malformed(_))
        ));

        let (_server, client) = server_with(
            ResponseTemplate::new(200).set_body_string(r#"DYConfigCallback({"data":{}});"#),
        )
        .await;
        assert!(matches!(
            client.fetch_names().await,
            Err(GiftConfigError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_spawn_refresh_fills_catalog_until_cancelled() {
        let (_server, client) = server_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"DYConfigCallback({"data":{"20000":{"name":"Fireworks"}}});"#),
        )
        .await;
        let catalog = GiftCatalog::default();
        let token = CancellationToken::new();

        let task = spawn_refresh(
            client,
            catalog.clone(),
            Duration::from_secs(3600),
            token.clone(),
        );
        for _ in 0..200 {
            if catalog.online_name_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(catalog.classify("20000").name, "Fireworks");

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
