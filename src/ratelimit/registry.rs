//! Independent limiters per upstream API.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::MeterguardConfig;
use crate::error::Result;

use super::limiter::RateLimiter;
use super::shared::SharedRateLimiter;

/// Lazily created limiters keyed by upstream name.
///
/// Each upstream gets its own state; calls against one never count
/// against another.
pub struct LimiterRegistry {
    limiters: DashMap<String, Arc<SharedRateLimiter>>,
    config: MeterguardConfig,
    clock: Arc<dyn Clock>,
}

impl LimiterRegistry {
    /// Create a registry using wall-clock time.
    pub fn new(config: MeterguardConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry with a custom time source.
    pub fn with_clock(config: MeterguardConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            limiters: DashMap::new(),
            config,
            clock,
        })
    }

    /// Get the limiter for an upstream, creating it on first use.
    pub fn limiter(&self, upstream: &str) -> Result<Arc<SharedRateLimiter>> {
        if let Some(existing) = self.limiters.get(upstream) {
            return Ok(existing.clone());
        }

        let limits = self.config.limits_for(upstream);
        let limiter = RateLimiter::from_config(limits)?;
        let entry = self
            .limiters
            .entry(upstream.to_string())
            .or_insert_with(|| {
                debug!(
                    upstream = %upstream,
                    short_window_limit = limits.short_window_limit,
                    long_window_limit = limits.long_window_limit,
                    "Creating upstream limiter"
                );
                Arc::new(SharedRateLimiter::with_clock(limiter, self.clock.clone()))
            });
        Ok(entry.value().clone())
    }

    /// Names of upstreams that currently have a limiter.
    pub fn upstreams(&self) -> Vec<String> {
        let mut names: Vec<String> = self.limiters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Get the number of active limiters.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Drop every limiter, resetting all counts.
    pub fn clear(&self) {
        self.limiters.clear();
    }
}
