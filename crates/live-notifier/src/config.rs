//! Live notifier configuration, loaded from environment variables.

use crate::actors::SupervisorConfig;
use crate::dispatch::RetryPolicy;
use crate::gifts::GiftTier;
use common::config::ObservabilityConfig;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DATA_FILE: &str = "data/live_notifier.json";
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 90;
pub const DEFAULT_RECONNECT_DELAY_SECONDS: u64 = 10;
pub const DEFAULT_SEND_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_SEND_DEGRADE_AFTER: u32 = 1;
pub const DEFAULT_SEND_BACKOFF_MS: u64 = 2000;
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 8;
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 10;
pub const DEFAULT_STREAM_GATEWAY_URL: &str = "ws://127.0.0.1:9300";
pub const DEFAULT_ROOM_API_URL: &str = "https://www.douyu.com/betard";
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "0.0.0.0:8090";
pub const DEFAULT_GIFT_CONFIG_URL: &str =
    "https://webconf.douyucdn.cn/resource/common/prop_gift_list/prop_gift_config.json";
pub const DEFAULT_GIFT_REFRESH_SECONDS: u64 = 6 * 60 * 60;

#[derive(Clone)]
pub struct Config {
    /// Durable state file.
    pub data_file: PathBuf,
    pub cooldown: Duration,
    pub reconnect_delay: Duration,
    pub retry: RetryPolicy,
    /// Maximum concurrent sends per notification.
    pub dispatch_concurrency: usize,
    /// How long in-flight sends may run after shutdown starts.
    pub shutdown_grace: Duration,
    /// Lowest tier that counts as a high-value gift.
    pub high_value_tier: GiftTier,
    pub stream_gateway_url: String,
    pub room_api_url: String,
    pub gift_config_url: String,
    /// `None` disables the online gift name refresh.
    pub gift_refresh_interval: Option<Duration>,
    pub webhook_url: String,
    pub webhook_token: Option<SecretString>,
    pub http_bind_address: String,
    pub observability: ObservabilityConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_file", &self.data_file)
            .field("cooldown", &self.cooldown)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("retry", &self.retry)
            .field("dispatch_concurrency", &self.dispatch_concurrency)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("high_value_tier", &self.high_value_tier)
            .field("stream_gateway_url", &self.stream_gateway_url)
            .field("room_api_url", &self.room_api_url)
            .field("gift_config_url", &self.gift_config_url)
            .field("gift_refresh_interval", &self.gift_refresh_interval)
            .field("webhook_url", &self.webhook_url)
            .field(
                "webhook_token",
                &self.webhook_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("http_bind_address", &self.http_bind_address)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let data_file = vars
            .get("NOTIFIER_DATA_FILE")
            .map_or_else(|| PathBuf::from(DEFAULT_DATA_FILE), PathBuf::from);

        let cooldown_secs = parse_or(vars, "NOTIFIER_COOLDOWN_SECONDS", DEFAULT_COOLDOWN_SECONDS)?;
        require_positive("NOTIFIER_COOLDOWN_SECONDS", cooldown_secs)?;

        let reconnect_secs = parse_or(
            vars,
            "NOTIFIER_RECONNECT_DELAY_SECONDS",
            DEFAULT_RECONNECT_DELAY_SECONDS,
        )?;
        require_positive("NOTIFIER_RECONNECT_DELAY_SECONDS", reconnect_secs)?;

        let max_attempts = parse_or(vars, "NOTIFIER_SEND_MAX_ATTEMPTS", DEFAULT_SEND_MAX_ATTEMPTS)?;
        require_positive("NOTIFIER_SEND_MAX_ATTEMPTS", max_attempts)?;

        let degrade_after = parse_or(
            vars,
            "NOTIFIER_SEND_DEGRADE_AFTER",
            DEFAULT_SEND_DEGRADE_AFTER,
        )?;
        let backoff_ms = parse_or(vars, "NOTIFIER_SEND_BACKOFF_MS", DEFAULT_SEND_BACKOFF_MS)?;

        let dispatch_concurrency = parse_or(
            vars,
            "NOTIFIER_DISPATCH_CONCURRENCY",
            DEFAULT_DISPATCH_CONCURRENCY,
        )?;
        require_positive("NOTIFIER_DISPATCH_CONCURRENCY", dispatch_concurrency)?;

        let grace_secs = parse_or(
            vars,
            "NOTIFIER_SHUTDOWN_GRACE_SECONDS",
            DEFAULT_SHUTDOWN_GRACE_SECONDS,
        )?;

        let high_value_tier = parse_or(vars, "NOTIFIER_HIGH_VALUE_TIER", GiftTier::Airplane)?;

        let gift_refresh_secs = parse_or(
            vars,
            "NOTIFIER_GIFT_REFRESH_SECONDS",
            DEFAULT_GIFT_REFRESH_SECONDS,
        )?;

        let webhook_url = vars
            .get("NOTIFIER_WEBHOOK_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("NOTIFIER_WEBHOOK_URL".to_string()))?
            .clone();

        let webhook_token = vars
            .get("NOTIFIER_WEBHOOK_TOKEN")
            .filter(|token| !token.is_empty())
            .map(|token| SecretString::from(token.clone()));

        let json_logs = parse_or(vars, "NOTIFIER_JSON_LOGS", false)?;
        let log_level = vars
            .get("NOTIFIER_LOG_LEVEL")
            .map_or("info", String::as_str);
        let observability =
            ObservabilityConfig::new(log_level, json_logs).map_err(|e| ConfigError::InvalidValue {
                var: "NOTIFIER_LOG_LEVEL".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Config {
            data_file,
            cooldown: Duration::from_secs(cooldown_secs),
            reconnect_delay: Duration::from_secs(reconnect_secs),
            retry: RetryPolicy {
                max_attempts,
                degrade_after,
                backoff: Duration::from_millis(backoff_ms),
            },
            dispatch_concurrency,
            shutdown_grace: Duration::from_secs(grace_secs),
            high_value_tier,
            stream_gateway_url: string_or(
                vars,
                "NOTIFIER_STREAM_GATEWAY_URL",
                DEFAULT_STREAM_GATEWAY_URL,
            ),
            room_api_url: string_or(vars, "NOTIFIER_ROOM_API_URL", DEFAULT_ROOM_API_URL),
            gift_config_url: string_or(vars, "NOTIFIER_GIFT_CONFIG_URL", DEFAULT_GIFT_CONFIG_URL),
            gift_refresh_interval: (gift_refresh_secs > 0)
                .then(|| Duration::from_secs(gift_refresh_secs)),
            webhook_url,
            webhook_token,
            http_bind_address: string_or(
                vars,
                "NOTIFIER_HTTP_BIND_ADDRESS",
                DEFAULT_HTTP_BIND_ADDRESS,
            ),
            observability,
        })
    }

    /// Supervisor settings derived from this config.
    #[must_use]
    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            cooldown: self.cooldown,
            reconnect_delay: self.reconnect_delay,
        }
    }
}

fn string_or(vars: &HashMap<String, String>, var: &str, default: &str) -> String {
    vars.get(var)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(vars: &HashMap<String, String>, var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match vars.get(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                var: var.to_string(),
                reason: format!("'{raw}': {e}"),
            }),
    }
}

fn require_positive<T: Default + PartialEq>(var: &str, value: T) -> Result<(), ConfigError> {
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
