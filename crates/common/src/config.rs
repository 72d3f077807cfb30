//! Common configuration types for the live notifier components.

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log level (trace, debug, info, warn, error), used when
    /// `RUST_LOG` is not set
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Build a config, validating the log level.
    ///
    /// # Errors
    ///
    /// Returns `CommonError::InvalidLogLevel` for unknown levels.
    pub fn new(log_level: &str, json_logs: bool) -> Result<Self> {
        let level = log_level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(CommonError::InvalidLogLevel(log_level.to_string()));
        }
        Ok(Self {
            log_level: level,
            json_logs,
        })
    }

    /// Default `EnvFilter` directive for a crate, e.g. `live_notifier=info`.
    #[must_use]
    pub fn default_directive(&self, crate_name: &str) -> String {
        format!("{crate_name}={}", self.log_level)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_level_is_normalized() {
        let config = ObservabilityConfig::new(" DEBUG ", true).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.json_logs);
        assert_eq!(
            config.default_directive("live_notifier"),
            "live_notifier=debug"
        );
    }

    #[test]
    fn test_unknown_level_rejected() {
        assert!(matches!(
            ObservabilityConfig::new("verbose", false),
            Err(CommonError::InvalidLogLevel(_))
        ));
    }
}
