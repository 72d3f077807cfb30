//! Send retry policy.
//!
//! A [`SendAttempt`] tracks one outstanding delivery: how many attempts have
//! failed, whether the next attempt may still carry the mass-mention marker,
//! and how long to wait before it.

use std::time::Duration;

/// Bounded retry with mass-mention degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per message, including the first (at least 1).
    pub max_attempts: u32,
    /// Failures after which the mass-mention marker is dropped.
    pub degrade_after: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            degrade_after: 1,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Start tracking a new send.
    #[must_use]
    pub fn begin(&self, wants_mass_mention: bool) -> SendAttempt {
        SendAttempt {
            policy: *self,
            wants_mass_mention,
            failures: 0,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Wait, then try again.
    RetryAfter(Duration),
    /// Attempts exhausted.
    Abandon,
}

/// Per-message retry state.
#[derive(Debug, Clone, Copy)]
pub struct SendAttempt {
    policy: RetryPolicy,
    wants_mass_mention: bool,
    failures: u32,
}

impl SendAttempt {
    /// Attempt number about to be made, starting at 1.
    #[must_use]
    pub fn number(&self) -> u32 {
        self.failures + 1
    }

    /// Whether the next attempt carries the mass-mention marker.
    #[must_use]
    pub fn mass_mention(&self) -> bool {
        self.wants_mass_mention && self.failures < self.policy.degrade_after
    }

    /// Whether the marker was requested but has been stripped.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.wants_mass_mention && !self.mass_mention()
    }

    /// Record a failed attempt and decide what happens next.
    pub fn record_failure(&mut self) -> NextStep {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts.max(1) {
            NextStep::Abandon
        } else {
            NextStep::RetryAfter(self.policy.backoff)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.degrade_after, 1);
        assert_eq!(policy.backoff, Duration::from_secs(2));
    }

    #[test]
    fn test_mass_mention_only_before_degradation() {
        let mut attempt = RetryPolicy::default().begin(true);
        assert!(attempt.mass_mention());
        assert!(!attempt.is_degraded());

        assert_eq!(
            attempt.record_failure(),
            NextStep::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(attempt.number(), 2);
        assert!(!attempt.mass_mention());
        assert!(attempt.is_degraded());

        assert_eq!(
            attempt.record_failure(),
            NextStep::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(attempt.record_failure(), NextStep::Abandon);
    }

    #[test]
    fn test_unmarked_send_never_degrades() {
        let mut attempt = RetryPolicy::default().begin(false);
        assert!(!attempt.mass_mention());
        let _ = attempt.record_failure();
        assert!(!attempt.is_degraded());
    }

    #[test]
    fn test_later_degradation_threshold() {
        let policy = RetryPolicy {
            max_attempts: 5,
            degrade_after: 3,
            backoff: Duration::from_millis(10),
        };
        let mut attempt = policy.begin(true);
        let mut marked = Vec::new();
        loop {
            marked.push(attempt.mass_mention());
            if attempt.record_failure() == NextStep::Abandon {
                break;
            }
        }
        assert_eq!(marked, vec![true, true, true, false, false]);
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let mut attempt = policy.begin(false);
        assert_eq!(attempt.record_failure(), NextStep::Abandon);
    }
}
