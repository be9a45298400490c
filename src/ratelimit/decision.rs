//! Admission outcomes and how they are reported to callers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP status a caller should answer with when refusing a request.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Which cap refused the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The burst cap (short window) is exhausted
    ShortWindowExceeded,
    /// The volume cap (long window) is exhausted
    LongWindowExceeded,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::ShortWindowExceeded => "short-window limit exceeded",
            DenialReason::LongWindowExceeded => "long-window limit exceeded",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Denied(DenialReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// The denial reason, if any.
    pub fn reason(&self) -> Option<DenialReason> {
        match self {
            Decision::Allowed => None,
            Decision::Denied(reason) => Some(*reason),
        }
    }
}

/// A refused request, as surfaced to whoever asked for the upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimited {
    /// Which cap refused the request
    pub reason: DenialReason,
    /// Human-readable description of the exhausted cap
    pub message: String,
    /// Suggested wait before retrying; a hint, not a guarantee
    pub retry_after: Duration,
}

impl RateLimited {
    /// HTTP status for this rejection.
    pub fn status_code(&self) -> u16 {
        TOO_MANY_REQUESTS
    }

    /// Whole seconds to wait, rounded up so a retry never comes too early.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// JSON body for a "too many requests" response.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": "Rate limit exceeded",
            "message": self.message,
            "reason": self.reason,
            "retry_after": format!("{} seconds", self.retry_after_secs()),
        })
    }
}

impl fmt::Display for RateLimited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (retry after {}s)",
            self.message,
            self.retry_after_secs()
        )
    }
}

/// Occupancy of both windows at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub short_window_count: u64,
    pub short_window_limit: u64,
    pub long_window_count: u64,
    pub long_window_limit: u64,
}

impl UsageSnapshot {
    pub fn short_window_remaining(&self) -> u64 {
        self.short_window_limit.saturating_sub(self.short_window_count)
    }

    pub fn long_window_remaining(&self) -> u64 {
        self.long_window_limit.saturating_sub(self.long_window_count)
    }
}
