use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Readiness policy for a freshly started peripheral service.
///
/// The variants are independent policies used by different peripheral
/// kinds; they are not meant to be merged into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum HealthPolicy {
    /// Ready as soon as one probe succeeds.
    FirstSuccess { interval: Duration, timeout: Duration },
    /// Ready after `required` probes succeed back to back.
    ConsecutiveSuccesses {
        required: u32,
        interval: Duration,
        timeout: Duration,
    },
}

impl HealthPolicy {
    pub fn first_success(interval: Duration, timeout: Duration) -> Self {
        HealthPolicy::FirstSuccess { interval, timeout }
    }

    pub fn consecutive(required: u32, interval: Duration, timeout: Duration) -> Self {
        HealthPolicy::ConsecutiveSuccesses {
            required: required.max(1),
            interval,
            timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            HealthPolicy::FirstSuccess { interval, .. } => *interval,
            HealthPolicy::ConsecutiveSuccesses { interval, .. } => *interval,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            HealthPolicy::FirstSuccess { timeout, .. } => *timeout,
            HealthPolicy::ConsecutiveSuccesses { timeout, .. } => *timeout,
        }
    }

    pub fn required_successes(&self) -> u32 {
        match self {
            HealthPolicy::FirstSuccess { .. } => 1,
            HealthPolicy::ConsecutiveSuccesses { required, .. } => *required,
        }
    }

    pub fn tracker(&self) -> HealthTracker {
        HealthTracker {
            required: self.required_successes(),
            streak: 0,
        }
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        HealthPolicy::first_success(Duration::from_secs(1), Duration::from_secs(10))
    }
}

/// Counts probe outcomes against a policy.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    required: u32,
    streak: u32,
}

impl HealthTracker {
    /// Record one probe outcome; returns true once the policy is satisfied.
    pub fn record(&mut self, success: bool) -> bool {
        if success {
            self.streak = self.streak.saturating_add(1);
        } else {
            self.streak = 0;
        }
        self.is_healthy()
    }

    pub fn is_healthy(&self) -> bool {
        self.streak >= self.required
    }
}
