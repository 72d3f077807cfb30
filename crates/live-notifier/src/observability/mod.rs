//! Observability for the live notifier.
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit fields. Room
//! ids appear in logs; destination ids are logged only at debug level and
//! never used as metric labels.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `notifier_rooms_watched` | Gauge | none |
//! | `notifier_link_reconnects_total` | Counter | none |
//! | `notifier_protocol_errors_total` | Counter | none |
//! | `notifier_notifications_emitted_total` | Counter | `kind` |
//! | `notifier_session_duration_seconds` | Histogram | none |
//! | `notifier_send_attempts_total` | Counter | `outcome` |
//! | `notifier_send_duration_seconds` | Histogram | `outcome` |
//! | `notifier_send_degraded_total` | Counter | none |
//! | `notifier_send_abandoned_total` | Counter | none |
//! | `notifier_deliveries_suppressed_total` | Counter | `reason` |
//! | `notifier_persistence_saves_total` | Counter | `outcome` |
//! | `notifier_unsaved_changes` | Gauge | none |
//! | `notifier_commands_total` | Counter | `command`, `outcome` |
//! | `notifier_actor_mailbox_depth` | Gauge | `actor_type` |
//! | `notifier_actor_panics_total` | Counter | `actor_type` |
//! | `notifier_gift_config_refreshes_total` | Counter | `outcome` |
//! | `notifier_gift_names_cached` | Gauge | none |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState, StartupStep};
pub use metrics::init_metrics_recorder;
