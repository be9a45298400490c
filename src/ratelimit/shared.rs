//! Mutex-guarded limiter for sharing across request handlers.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::config::LimiterConfig;
use crate::error::{MeterguardError, Result};

use super::backend::AdmissionControl;
use super::decision::{Decision, UsageSnapshot};
use super::limiter::RateLimiter;

/// A [`RateLimiter`] behind a lock, reading time from a [`Clock`].
///
/// Prune, both checks and the append happen under a single lock
/// acquisition, so concurrent callers can never overshoot a cap.
pub struct SharedRateLimiter {
    inner: Mutex<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl SharedRateLimiter {
    /// Wrap a limiter, using wall-clock time.
    pub fn new(limiter: RateLimiter) -> Self {
        Self::with_clock(limiter, Arc::new(SystemClock))
    }

    /// Wrap a limiter with a custom time source.
    pub fn with_clock(limiter: RateLimiter, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(limiter),
            clock,
        }
    }

    /// Create a shared limiter from configuration.
    pub fn from_config(config: &LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::with_clock(RateLimiter::from_config(config)?, clock))
    }

    /// Admission check at the clock's current time.
    pub fn try_acquire(&self) -> Decision {
        let now = self.clock.now();
        self.try_acquire_at(now)
    }

    /// Admission check at an explicit time.
    pub fn try_acquire_at(&self, now: Timestamp) -> Decision {
        self.inner.lock().try_acquire(now)
    }

    /// Current occupancy of both windows.
    pub fn snapshot(&self) -> UsageSnapshot {
        let now = self.clock.now();
        self.inner.lock().usage(now)
    }
}

#[async_trait]
impl AdmissionControl for SharedRateLimiter {
    async fn admit(&self) -> Result<()> {
        let now = self.clock.now();
        self.inner
            .lock()
            .check(now)
            .map_err(MeterguardError::RateLimited)
    }

    async fn usage(&self) -> Result<UsageSnapshot> {
        Ok(self.snapshot())
    }
}
