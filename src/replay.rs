//! Replaying request traces through a limiter.
//!
//! A trace is one arrival time per line, either RFC 3339 or decimal seconds
//! since the Unix epoch. Blank lines and `#` comments are skipped.

use std::io::BufRead;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Timestamp;
use crate::error::{MeterguardError, Result};
use crate::ratelimit::{Decision, DenialReason, RateLimiter};

/// Outcome of one replayed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayRecord {
    pub at: Timestamp,
    pub decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Totals over a replayed trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub total: u64,
    pub allowed: u64,
    pub short_window_denied: u64,
    pub long_window_denied: u64,
}

/// Parse a single trace entry.
pub fn parse_timestamp(entry: &str) -> Result<Timestamp> {
    let entry = entry.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(entry) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let secs: f64 = entry
        .parse()
        .map_err(|_| MeterguardError::InvalidInput(format!("not a timestamp: '{}'", entry)))?;
    if !secs.is_finite() {
        return Err(MeterguardError::InvalidInput(format!("not a timestamp: '{}'", entry)));
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
        .ok_or_else(|| MeterguardError::InvalidInput(format!("timestamp out of range: '{}'", entry)))
}

/// Read a whole trace, skipping blank lines and comments.
pub fn read_trace<R: BufRead>(reader: R) -> Result<Vec<Timestamp>> {
    let mut trace = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        let at = parse_timestamp(entry).map_err(|e| {
            warn!(line = index + 1, error = %e, "Rejecting trace");
            MeterguardError::InvalidInput(format!("line {}: {}", index + 1, e))
        })?;
        trace.push(at);
    }
    Ok(trace)
}

/// Run every arrival in `trace` through `limiter`, in order.
pub fn replay(limiter: &mut RateLimiter, trace: &[Timestamp]) -> (Vec<ReplayRecord>, ReplaySummary) {
    let mut summary = ReplaySummary::default();
    let records = trace
        .iter()
        .map(|&at| {
            summary.total += 1;
            match limiter.try_acquire(at) {
                Decision::Allowed => {
                    summary.allowed += 1;
                    ReplayRecord {
                        at,
                        decision: "allowed",
                        reason: None,
                        retry_after_secs: None,
                    }
                }
                Decision::Denied(reason) => {
                    match reason {
                        DenialReason::ShortWindowExceeded => summary.short_window_denied += 1,
                        DenialReason::LongWindowExceeded => summary.long_window_denied += 1,
                    }
                    ReplayRecord {
                        at,
                        decision: "denied",
                        reason: Some(reason),
                        retry_after_secs: Some(limiter.rejection(at, reason).retry_after_secs()),
                    }
                }
            }
        })
        .collect();

    info!(
        total = summary.total,
        allowed = summary.allowed,
        short_window_denied = summary.short_window_denied,
        long_window_denied = summary.long_window_denied,
        "Replay finished"
    );
    (records, summary)
}
