//! `NotificationDispatcher` - fans one notification out to its room's subscribers.
//!
//! Per destination:
//! - live-start is always sent, with the mass-mention marker iff `at_all`
//! - live-end is always sent, never with the marker
//! - gift is sent only with `gift_notify`, and under `high_value_only` only
//!   for gifts at or above the catalog threshold
//!
//! Sends run concurrently up to the semaphore's permits. Each send retries
//! according to the [`RetryPolicy`] and is abandoned (logged, not re-queued)
//! once attempts run out.

use super::retry::{NextStep, RetryPolicy};
use crate::clients::MessageSender;
use crate::gifts::{GiftCatalog, GiftInfo};
use crate::notification::{Notification, NotificationKind};
use crate::observability::metrics as prom;
use crate::registry::model::SubscriptionConfig;
use crate::registry::SubscriptionRegistry;
use crate::render;
use common::types::DestinationId;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

/// Counts from one `dispatch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Deliveries that succeeded, possibly after retries.
    pub sent: usize,
    /// Deliveries skipped by subscription rules.
    pub suppressed: usize,
    /// Deliveries that failed on every attempt.
    pub abandoned: usize,
}

/// Per-destination decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Send { mass_mention: bool },
    Suppress(&'static str),
}

/// Resolves destinations and delivers notifications.
pub struct NotificationDispatcher {
    registry: Arc<SubscriptionRegistry>,
    sender: Arc<dyn MessageSender>,
    policy: RetryPolicy,
    catalog: GiftCatalog,
    semaphore: Arc<Semaphore>,
}

impl NotificationDispatcher {
    /// Create a dispatcher.
    ///
    /// `concurrency` bounds in-flight sends across all notifications (at least 1).
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        sender: Arc<dyn MessageSender>,
        policy: RetryPolicy,
        catalog: GiftCatalog,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            sender,
            policy,
            catalog,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Deliver `notification` to every destination subscribed to its room.
    #[instrument(
        skip_all,
        name = "notifier.dispatch",
        fields(room_id = %notification.room_id, kind = notification.kind.as_str())
    )]
    pub async fn dispatch(&self, notification: &Notification) -> DispatchReport {
        let room_id = notification.room_id;
        let mut report = DispatchReport::default();

        let destinations = self.registry.destinations_for(room_id).await;
        if destinations.is_empty() {
            debug!(
                target: "notifier.dispatch",
                room_id = %room_id,
                "No subscribers, nothing to send"
            );
            return report;
        }

        let name = self
            .registry
            .room(room_id)
            .await
            .map(|info| info.name)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Room {room_id}"));

        let (body, gift_info) = match &notification.kind {
            NotificationKind::LiveStart { started_at } => {
                (render::live_start(room_id, &name, *started_at), None)
            }
            NotificationKind::LiveEnd { duration, ended_at } => (
                render::live_end(room_id, &name, *duration, *ended_at),
                None,
            ),
            NotificationKind::Gift(gift) => {
                let info = self.catalog.classify(&gift.gift_id);
                (render::gift(&name, gift, &info), Some(info))
            }
        };
        let body: Arc<str> = body.into();

        let mut sends = JoinSet::new();
        for (destination, config) in destinations {
            match self.decide(&notification.kind, &config, gift_info.as_ref()) {
                Delivery::Suppress(reason) => {
                    debug!(
                        target: "notifier.dispatch",
                        room_id = %room_id,
                        destination = %destination,
                        reason,
                        "Delivery suppressed"
                    );
                    prom::record_delivery_suppressed(reason);
                    report.suppressed += 1;
                }
                Delivery::Send { mass_mention } => {
                    let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                        report.abandoned += 1;
                        continue;
                    };
                    sends.spawn(deliver(
                        Arc::clone(&self.sender),
                        self.policy,
                        destination,
                        Arc::clone(&body),
                        mass_mention,
                        permit,
                    ));
                }
            }
        }

        while let Some(result) = sends.join_next().await {
            match result {
                Ok(true) => report.sent += 1,
                Ok(false) => report.abandoned += 1,
                Err(e) => {
                    error!(
                        target: "notifier.dispatch",
                        room_id = %room_id,
                        error = ?e,
                        "Send task failed"
                    );
                    report.abandoned += 1;
                }
            }
        }

        debug!(
            target: "notifier.dispatch",
            room_id = %room_id,
            sent = report.sent,
            suppressed = report.suppressed,
            abandoned = report.abandoned,
            "Dispatch complete"
        );
        report
    }

    fn decide(
        &self,
        kind: &NotificationKind,
        config: &SubscriptionConfig,
        gift_info: Option<&GiftInfo>,
    ) -> Delivery {
        match kind {
            NotificationKind::LiveStart { .. } => Delivery::Send {
                mass_mention: config.at_all,
            },
            NotificationKind::LiveEnd { .. } => Delivery::Send {
                mass_mention: false,
            },
            NotificationKind::Gift(_) => {
                if !config.gift_notify {
                    return Delivery::Suppress("gift_disabled");
                }
                let high_value = gift_info.is_some_and(|info| self.catalog.is_high_value(info));
                if config.high_value_only && !high_value {
                    return Delivery::Suppress("below_threshold");
                }
                Delivery::Send {
                    mass_mention: false,
                }
            }
        }
    }
}

/// Send one message with retries. Returns whether it was delivered.
async fn deliver(
    sender: Arc<dyn MessageSender>,
    policy: RetryPolicy,
    destination: DestinationId,
    body: Arc<str>,
    wants_mass_mention: bool,
    _permit: OwnedSemaphorePermit,
) -> bool {
    let mut attempt = policy.begin(wants_mass_mention);
    let mut degraded = false;

    loop {
        if attempt.is_degraded() && !degraded {
            degraded = true;
            prom::record_send_degraded();
            debug!(
                target: "notifier.dispatch",
                destination = %destination,
                attempt = attempt.number(),
                "Retrying without mass mention"
            );
        }

        let started = Instant::now();
        let result = sender
            .send(&destination, &body, attempt.mass_mention())
            .await;
        prom::record_send_attempt(result.is_ok(), started.elapsed());

        let Err(e) = result else {
            return true;
        };

        match attempt.record_failure() {
            NextStep::RetryAfter(delay) => {
                warn!(
                    target: "notifier.dispatch",
                    destination = %destination,
                    error = %e,
                    failed_attempts = attempt.number() - 1,
                    "Send failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            NextStep::Abandon => {
                error!(
                    target: "notifier.dispatch",
                    destination = %destination,
                    error = %e,
                    attempts = policy.max_attempts,
                    "Send abandoned after retries"
                );
                prom::record_send_abandoned();
                return false;
            }
        }
    }
}
