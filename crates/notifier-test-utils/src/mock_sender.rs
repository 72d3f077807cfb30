//! Recording message sender.
//!
//! Records every attempt, successful or not. Failures are scripted per
//! destination: fail the first N attempts, or fail every attempt.

use async_trait::async_trait;
use common::types::DestinationId;
use live_notifier::clients::MessageSender;
use live_notifier::errors::SendError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub destination: String,
    pub message: String,
    pub mass_mention: bool,
    /// Whether the attempt was accepted.
    pub delivered: bool,
}

#[derive(Debug, Clone, Copy)]
enum FailureScript {
    First(usize),
    Always,
}

/// `MessageSender` that records attempts.
#[derive(Clone, Default)]
pub struct RecordingSender {
    attempts: Arc<Mutex<Vec<SentMessage>>>,
    failures: Arc<Mutex<HashMap<String, FailureScript>>>,
}

impl RecordingSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the first `count` attempts to `destination`.
    pub fn fail_first(&self, destination: &str, count: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert(destination.to_string(), FailureScript::First(count));
    }

    /// Reject every attempt to `destination`.
    pub fn always_fail(&self, destination: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(destination.to_string(), FailureScript::Always);
    }

    /// Every attempt in order.
    #[must_use]
    pub fn attempts(&self) -> Vec<SentMessage> {
        self.attempts.lock().unwrap().clone()
    }

    /// Attempts to one destination, in order.
    #[must_use]
    pub fn attempts_to(&self, destination: &str) -> Vec<SentMessage> {
        self.attempts()
            .into_iter()
            .filter(|m| m.destination == destination)
            .collect()
    }

    /// Accepted messages to one destination, in order.
    #[must_use]
    pub fn delivered_to(&self, destination: &str) -> Vec<SentMessage> {
        self.attempts_to(destination)
            .into_iter()
            .filter(|m| m.delivered)
            .collect()
    }

    /// Accepted messages across all destinations.
    #[must_use]
    pub fn delivered(&self) -> Vec<SentMessage> {
        self.attempts().into_iter().filter(|m| m.delivered).collect()
    }

    pub fn clear(&self) {
        self.attempts.lock().unwrap().clear();
    }

    fn should_fail(&self, destination: &str) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(destination) {
            Some(FailureScript::Always) => true,
            Some(FailureScript::First(left)) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(
        &self,
        destination: &DestinationId,
        message: &str,
        wants_mass_mention: bool,
    ) -> Result<(), SendError> {
        let fail = self.should_fail(destination.as_str());
        self.attempts.lock().unwrap().push(SentMessage {
            destination: destination.as_str().to_string(),
            message: message.to_string(),
            mass_mention: wants_mass_mention,
            delivered: !fail,
        });

        if fail {
            Err(SendError::Rejected {
                status: 503,
                detail: "scripted failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
