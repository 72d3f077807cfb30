//! Metrics definitions for the live notifier.
//!
//! All metrics follow Prometheus naming conventions:
//! - `notifier_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded; room and destination ids are never used as labels:
//! - `kind`: 3 values (`live_start`, `live_end`, `gift`)
//! - `outcome`: 2 values (success, failure)
//! - `reason`: bounded suppression reasons
//! - `command`: 11 command names
//! - `actor_type`: 3 values (supervisor, room, dispatcher)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Outbound sends go over HTTP to a chat bridge
        .set_buckets_for_metric(
            Matcher::Prefix("notifier_send".to_string()),
            &[
                0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set send latency buckets: {e}"))?
        // Session lengths range from minutes to a day
        .set_buckets_for_metric(
            Matcher::Full("notifier_session_duration_seconds".to_string()),
            &[
                60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0, 28800.0, 86400.0,
            ],
        )
        .map_err(|e| format!("Failed to set session duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Rooms & Links
// ============================================================================

/// Set the number of watched rooms.
///
/// Metric: `notifier_rooms_watched`
pub fn set_rooms_watched(count: usize) {
    // usize to f64 conversion is safe for realistic room counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("notifier_rooms_watched").set(count as f64);
}

/// Record a link reconnect attempt.
///
/// Metric: `notifier_link_reconnects_total`
pub fn record_link_reconnect() {
    counter!("notifier_link_reconnects_total").increment(1);
}

/// Record a malformed event from the stream client.
///
/// Metric: `notifier_protocol_errors_total`
pub fn record_protocol_error() {
    counter!("notifier_protocol_errors_total").increment(1);
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Record a notification emitted by a room actor.
///
/// Metric: `notifier_notifications_emitted_total`
/// Labels: `kind`
pub fn record_notification_emitted(kind: &'static str) {
    counter!("notifier_notifications_emitted_total", "kind" => kind).increment(1);
}

/// Record the length of a finished live session.
///
/// Metric: `notifier_session_duration_seconds`
pub fn record_session_duration(duration: Duration) {
    histogram!("notifier_session_duration_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Dispatch
// ============================================================================

/// Record a single send attempt.
///
/// Metric: `notifier_send_attempts_total`, `notifier_send_duration_seconds`
/// Labels: `outcome` (success, failure)
pub fn record_send_attempt(success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!("notifier_send_attempts_total", "outcome" => outcome).increment(1);
    histogram!("notifier_send_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Record a retry that dropped the mass-mention marker.
///
/// Metric: `notifier_send_degraded_total`
pub fn record_send_degraded() {
    counter!("notifier_send_degraded_total").increment(1);
}

/// Record a delivery abandoned after exhausting retries.
///
/// Metric: `notifier_send_abandoned_total`
pub fn record_send_abandoned() {
    counter!("notifier_send_abandoned_total").increment(1);
}

/// Record a delivery suppressed by a subscription rule.
///
/// Metric: `notifier_deliveries_suppressed_total`
/// Labels: `reason` (`gift_disabled`, `below_threshold`)
pub fn record_delivery_suppressed(reason: &'static str) {
    counter!("notifier_deliveries_suppressed_total", "reason" => reason).increment(1);
}

// ============================================================================
// Persistence & Commands
// ============================================================================

/// Record the result of a snapshot save.
///
/// Metric: `notifier_persistence_saves_total`
/// Labels: `outcome` (success, failure)
pub fn record_persistence_save(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("notifier_persistence_saves_total", "outcome" => outcome).increment(1);
}

/// Set the number of mutations not yet durably saved.
///
/// Metric: `notifier_unsaved_changes`
pub fn set_unsaved_changes(count: u64) {
    // u64 to f64 conversion is safe for realistic counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("notifier_unsaved_changes").set(count as f64);
}

/// Record an executed command.
///
/// Metric: `notifier_commands_total`
/// Labels: `command`, `outcome` (success, error)
pub fn record_command(command: &'static str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    counter!("notifier_commands_total", "command" => command, "outcome" => outcome).increment(1);
}

/// Record the outcome of a gift config refresh.
///
/// Metric: `notifier_gift_config_refreshes_total`
/// Labels: `outcome` (success, failure)
pub fn record_gift_config_refresh(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("notifier_gift_config_refreshes_total", "outcome" => outcome).increment(1);
}

/// Set the number of gift names loaded from the online config.
///
/// Metric: `notifier_gift_names_cached`
pub fn set_gift_names_cached(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("notifier_gift_names_cached").set(count as f64);
}

// ============================================================================
// Actors
// ============================================================================

/// Set the mailbox depth for an actor type.
///
/// Metric: `notifier_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    // usize to f64 conversion is safe for realistic mailbox depths
    #[allow(clippy::cast_precision_loss)]
    gauge!("notifier_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}

/// Record an actor panic.
///
/// Metric: `notifier_actor_panics_total`
/// Labels: `actor_type`
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("notifier_actor_panics_total", "actor_type" => actor_type).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; the tests check that
    // every helper can be called from any context without panicking.
    #[test]
    fn test_helpers_without_recorder() {
        set_rooms_watched(3);
        record_link_reconnect();
        record_protocol_error();
        record_notification_emitted("live_start");
        record_session_duration(Duration::from_secs(600));
        record_send_attempt(true, Duration::from_millis(20));
        record_send_attempt(false, Duration::from_millis(20));
        record_send_degraded();
        record_send_abandoned();
        record_delivery_suppressed("gift_disabled");
        record_persistence_save(false);
        set_unsaved_changes(2);
        record_command("sub", true);
        record_gift_config_refresh(false);
        set_gift_names_cached(12);
        set_actor_mailbox_depth("room", 4);
        record_actor_panic("room");
    }
}
