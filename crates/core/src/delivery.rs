//! Delivery queue state machine and retry policy.
//!
//! A queue entry moves `pending -> processing -> {delivered | pending | failed}`.
//! This module decides *which* of those transitions follows a failed attempt;
//! the repository applies it atomically.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default number of attempts before an entry is marked `failed`.
pub const DEFAULT_MAX_ATTEMPTS: i16 = 5;

/// Default backoff base in seconds.
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 30;

/// Default backoff ceiling in seconds.
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// DeliveryStatus
// ---------------------------------------------------------------------------

/// Status of a `delivery_queue` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    /// `delivered` and `failed` are final; nothing moves an entry out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

impl FromStr for DeliveryStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "unknown delivery status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// What happens to an entry after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to `pending`, eligible again after `delay`.
    Retry { attempts: i16, delay: Duration },
    /// Terminal `failed`.
    GiveUp { attempts: i16 },
}

impl RetryDecision {
    pub fn attempts(&self) -> i16 {
        match self {
            Self::Retry { attempts, .. } | Self::GiveUp { attempts } => *attempts,
        }
    }
}

/// Exponential backoff: `base * 2^attempts`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
}

impl RetryPolicy {
    /// Build a policy. `max` is raised to `base` if it is smaller.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before the next attempt, given the number of attempts made so far.
    pub fn backoff(&self, attempts: i16) -> Duration {
        let exponent = u32::try_from(attempts).unwrap_or(0);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Decide the transition after a failed attempt.
    ///
    /// `previous_attempts` is the counter stored on the entry before this
    /// attempt; it is incremented here.
    pub fn after_failure(&self, previous_attempts: i16, max_attempts: i16) -> RetryDecision {
        let attempts = previous_attempts.saturating_add(1);
        if attempts >= max_attempts {
            RetryDecision::GiveUp { attempts }
        } else {
            RetryDecision::Retry {
                attempts,
                delay: self.backoff(attempts),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_BACKOFF_BASE_SECS),
            Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
