//! Core dual-window rate limiter.

use std::time::Duration;

use chrono::TimeDelta;
use tracing::{debug, trace};

use crate::clock::Timestamp;
use crate::config::LimiterConfig;
use crate::error::Result;

use super::decision::{Decision, DenialReason, RateLimited, UsageSnapshot};
use super::window::SlidingWindow;

/// Admission control against a burst cap and a volume cap.
///
/// Every accepted event is recorded in both windows. The limiter takes
/// `&mut self` and does no locking of its own; see [`super::SharedRateLimiter`]
/// and [`super::LimiterActor`] for sharing it between tasks.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Burst cap (e.g. per minute)
    short: SlidingWindow,
    /// Volume cap (e.g. per day)
    long: SlidingWindow,
}

impl RateLimiter {
    /// Create a limiter with explicit caps and window lengths.
    pub fn new(
        short_window_limit: u64,
        short_window: TimeDelta,
        long_window_limit: u64,
        long_window: TimeDelta,
    ) -> Self {
        debug!(
            short_window_limit,
            short_window_secs = short_window.num_seconds(),
            long_window_limit,
            long_window_secs = long_window.num_seconds(),
            "Creating rate limiter"
        );
        Self {
            short: SlidingWindow::new(short_window_limit, short_window),
            long: SlidingWindow::new(long_window_limit, long_window),
        }
    }

    /// Create a limiter from validated configuration.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.short_window_limit,
            config.short_window()?,
            config.long_window_limit,
            config.long_window()?,
        ))
    }

    /// Decide whether a request arriving at `now` may proceed.
    ///
    /// Both windows are pruned first. The short window is checked before the
    /// long one, so when both are exhausted the short-window reason wins. A
    /// denial leaves the recorded events untouched.
    pub fn try_acquire(&mut self, now: Timestamp) -> Decision {
        self.prune(now);

        trace!(
            short_count = self.short.len(),
            long_count = self.long.len(),
            "Checking rate limit"
        );

        if self.short.is_full() {
            debug!(limit = self.short.limit(), "Short-window limit exceeded");
            return Decision::Denied(DenialReason::ShortWindowExceeded);
        }

        if self.long.is_full() {
            debug!(limit = self.long.limit(), "Long-window limit exceeded");
            return Decision::Denied(DenialReason::LongWindowExceeded);
        }

        self.short.record(now);
        self.long.record(now);
        Decision::Allowed
    }

    /// Like [`try_acquire`](Self::try_acquire), but a denial comes back as a
    /// [`RateLimited`] carrying a message and a retry hint.
    pub fn check(&mut self, now: Timestamp) -> std::result::Result<(), RateLimited> {
        match self.try_acquire(now) {
            Decision::Allowed => Ok(()),
            Decision::Denied(reason) => Err(self.rejection(now, reason)),
        }
    }

    /// Report occupancy of both windows after pruning. Never records.
    pub fn usage(&mut self, now: Timestamp) -> UsageSnapshot {
        self.prune(now);
        UsageSnapshot {
            short_window_count: self.short.len(),
            short_window_limit: self.short.limit(),
            long_window_count: self.long.len(),
            long_window_limit: self.long.limit(),
        }
    }

    /// Time until the window behind `reason` has room again.
    pub fn retry_after(&self, now: Timestamp, reason: DenialReason) -> Duration {
        self.window(reason)
            .time_until_available(now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Build the caller-facing rejection for a denial at `now`.
    pub fn rejection(&self, now: Timestamp, reason: DenialReason) -> RateLimited {
        let window = self.window(reason);
        RateLimited {
            reason,
            message: format!(
                "Rate limit exceeded: {} requests per {}",
                window.limit(),
                describe_window(window.duration())
            ),
            retry_after: self.retry_after(now, reason),
        }
    }

    pub fn short_window(&self) -> &SlidingWindow {
        &self.short
    }

    pub fn long_window(&self) -> &SlidingWindow {
        &self.long
    }

    fn window(&self, reason: DenialReason) -> &SlidingWindow {
        match reason {
            DenialReason::ShortWindowExceeded => &self.short,
            DenialReason::LongWindowExceeded => &self.long,
        }
    }

    fn prune(&mut self, now: Timestamp) {
        let short_removed = self.short.prune(now);
        let long_removed = self.long.prune(now);
        if short_removed > 0 || long_removed > 0 {
            trace!(short_removed, long_removed, "Pruned expired events");
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        let config = LimiterConfig::default();
        Self::new(
            config.short_window_limit,
            TimeDelta::seconds(config.short_window_secs as i64),
            config.long_window_limit,
            TimeDelta::seconds(config.long_window_secs as i64),
        )
    }
}

/// Render a window length the way people say it: "minute", "day", "90 seconds".
fn describe_window(duration: TimeDelta) -> String {
    match duration.num_seconds() {
        1 => "second".to_string(),
        60 => "minute".to_string(),
        3_600 => "hour".to_string(),
        86_400 => "day".to_string(),
        secs => format!("{} seconds", secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_WINDOW_SECS;
    use chrono::{DateTime, Utc};
    use rand::Rng;

    fn at(secs: i64) -> Timestamp {
        DateTime::UNIX_EPOCH + TimeDelta::seconds(secs)
    }

    fn dual(short_limit: u64, long_limit: u64) -> RateLimiter {
        RateLimiter::new(
            short_limit,
            TimeDelta::seconds(60),
            long_limit,
            TimeDelta::hours(24),
        )
    }

    const ALLOWED: Decision = Decision::Allowed;
    const SHORT: Decision = Decision::Denied(DenialReason::ShortWindowExceeded);
    const LONG: Decision = Decision::Denied(DenialReason::LongWindowExceeded);

    #[test]
    fn test_burst_denied_after_short_limit() {
        let mut limiter = dual(2, 100);
        let outcomes: Vec<_> = [0, 1, 2].iter().map(|&s| limiter.try_acquire(at(s))).collect();
        assert_eq!(outcomes, vec![ALLOWED, ALLOWED, SHORT]);
    }

    #[test]
    fn test_short_window_expiry_readmits() {
        let mut limiter = dual(2, 100);
        let outcomes: Vec<_> = [0, 1, 61].iter().map(|&s| limiter.try_acquire(at(s))).collect();
        assert_eq!(outcomes, vec![ALLOWED, ALLOWED, ALLOWED]);
    }

    #[test]
    fn test_long_window_denial() {
        let mut limiter = dual(100, 1);
        assert_eq!(limiter.try_acquire(at(0)), ALLOWED);
        assert_eq!(limiter.try_acquire(at(10)), LONG);
    }

    #[test]
    fn test_short_window_reported_when_both_exhausted() {
        let mut limiter = dual(5, 5);
        for secs in 0..5 {
            assert_eq!(limiter.try_acquire(at(secs)), ALLOWED);
        }
        assert_eq!(limiter.try_acquire(at(5)), SHORT);
    }

    #[test]
    fn test_window_expiry_after_full_burst() {
        let mut limiter = dual(10, 100);
        for _ in 0..10 {
            assert_eq!(limiter.try_acquire(at(0)), ALLOWED);
        }
        assert_eq!(limiter.try_acquire(at(30)), SHORT);
        assert_eq!(limiter.try_acquire(at(61)), ALLOWED);
    }

    #[test]
    fn test_denial_does_not_record() {
        let mut limiter = dual(1, 100);
        assert_eq!(limiter.try_acquire(at(0)), ALLOWED);

        let before = limiter.usage(at(1));
        assert_eq!(limiter.try_acquire(at(1)), SHORT);
        assert_eq!(limiter.usage(at(1)), before);
        assert_eq!(limiter.try_acquire(at(1)), SHORT);
    }

    #[test]
    fn test_long_window_expires_after_a_day() {
        let mut limiter = dual(100, 2);
        assert_eq!(limiter.try_acquire(at(0)), ALLOWED);
        assert_eq!(limiter.try_acquire(at(3_600)), ALLOWED);
        assert_eq!(limiter.try_acquire(at(7_200)), LONG);
        assert_eq!(limiter.try_acquire(at(86_401)), ALLOWED);
        assert_eq!(limiter.try_acquire(at(86_402)), LONG);
    }

    #[test]
    fn test_usage_only_shrinks() {
        let mut limiter = dual(10, 100);
        for secs in 0..5 {
            limiter.try_acquire(at(secs));
        }

        let first = limiter.usage(at(30));
        assert_eq!(first.short_window_count, 5);
        assert_eq!(first.long_window_count, 5);

        let second = limiter.usage(at(62));
        assert_eq!(second.short_window_count, 3);
        assert_eq!(second.long_window_count, 5);
        assert_eq!(second.short_window_remaining(), 7);
    }

    #[test]
    fn test_zero_limit_denies_everything() {
        let mut limiter = dual(0, 100);
        assert_eq!(limiter.try_acquire(at(0)), SHORT);
        assert_eq!(limiter.usage(at(0)).long_window_count, 0);
    }

    #[test]
    fn test_rejection_message_and_retry_hint() {
        let mut limiter = dual(2, 100);
        limiter.try_acquire(at(0));
        limiter.try_acquire(at(10));

        let denial = limiter.check(at(20)).unwrap_err();
        assert_eq!(denial.reason, DenialReason::ShortWindowExceeded);
        assert_eq!(denial.message, "Rate limit exceeded: 2 requests per minute");
        assert_eq!(denial.retry_after_secs(), 41);

        let mut daily = dual(100, 1);
        daily.try_acquire(at(0));
        let denial = daily.check(at(10)).unwrap_err();
        assert_eq!(denial.message, "Rate limit exceeded: 1 requests per day");
        assert_eq!(denial.retry_after_secs(), 86_391);
    }

    #[test]
    fn test_retry_hint_is_accurate() {
        let mut limiter = dual(3, 100);
        for secs in [0, 5, 9] {
            limiter.try_acquire(at(secs));
        }
        let now = at(12);
        let wait = limiter.retry_after(now, DenialReason::ShortWindowExceeded);
        let retry_at = now + TimeDelta::from_std(wait).unwrap();

        assert_eq!(limiter.try_acquire(retry_at - TimeDelta::milliseconds(1)), SHORT);
        assert_eq!(limiter.try_acquire(retry_at), ALLOWED);
    }

    #[test]
    fn test_from_config() {
        let config = LimiterConfig::with_limits(2, 100);
        let mut limiter = RateLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.short_window().duration(), TimeDelta::seconds(60));
        assert_eq!(limiter.long_window().duration(), TimeDelta::hours(24));

        assert_eq!(limiter.try_acquire(at(0)), ALLOWED);
        assert_eq!(limiter.try_acquire(at(0)), ALLOWED);
        assert_eq!(limiter.try_acquire(at(0)), SHORT);
    }

    #[test]
    fn test_extreme_timestamps_do_not_panic() {
        let mut limiter = dual(1, 100);
        assert_eq!(limiter.try_acquire(DateTime::<Utc>::MIN_UTC), ALLOWED);
        assert_eq!(limiter.try_acquire(DateTime::<Utc>::MIN_UTC), SHORT);

        let mut limiter = dual(1, 100);
        let late = DateTime::<Utc>::MAX_UTC;
        assert_eq!(limiter.try_acquire(late), ALLOWED);
        let denial = limiter.check(late).unwrap_err();
        assert_eq!(denial.retry_after_secs(), 60);
    }

    #[test]
    fn test_longest_configured_window_admits() {
        let config = LimiterConfig {
            short_window_secs: MAX_WINDOW_SECS,
            long_window_secs: MAX_WINDOW_SECS,
            ..LimiterConfig::with_limits(1, 1)
        };
        let mut limiter = RateLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.try_acquire(at(0)), ALLOWED);
        assert_eq!(limiter.try_acquire(Utc::now()), SHORT);
        assert_eq!(limiter.try_acquire(DateTime::<Utc>::MIN_UTC), SHORT);
    }

    #[test]
    fn test_from_invalid_config() {
        let config = LimiterConfig {
            short_window_secs: 0,
            ..LimiterConfig::default()
        };
        assert!(RateLimiter::from_config(&config).is_err());
    }

    #[test]
    fn test_default_matches_default_config() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.short_window().limit(), 10);
        assert_eq!(limiter.long_window().limit(), 100);
        assert_eq!(limiter.long_window().duration(), TimeDelta::days(1));
    }

    #[test]
    fn test_caps_hold_for_random_call_patterns() {
        let mut rng = rand::thread_rng();

        for _ in 0..20 {
            let short_limit = rng.gen_range(1..8);
            let long_limit = rng.gen_range(1..40);
            let mut limiter = dual(short_limit, long_limit);

            let mut now = at(0);
            let mut accepted = Vec::new();
            for _ in 0..500 {
                // Mix bursts, steady traffic and long gaps.
                let gap_ms = match rng.gen_range(0..10) {
                    0..=5 => rng.gen_range(0..2_000),
                    6..=8 => rng.gen_range(0..60_000),
                    _ => rng.gen_range(0..7_200_000),
                };
                now += TimeDelta::milliseconds(gap_ms);
                if limiter.try_acquire(now).is_allowed() {
                    accepted.push(now);
                }
            }

            for (i, &start) in accepted.iter().enumerate() {
                let in_minute = accepted[i..]
                    .iter()
                    .take_while(|&&t| t - start < TimeDelta::seconds(60))
                    .count() as u64;
                let in_day = accepted[i..]
                    .iter()
                    .take_while(|&&t| t - start < TimeDelta::hours(24))
                    .count() as u64;
                assert!(in_minute <= short_limit);
                assert!(in_day <= long_limit);
            }
        }
    }

    #[test]
    fn test_short_events_are_subset_of_long_events() {
        let mut limiter = dual(3, 10);
        for secs in [0, 1, 2, 70, 71, 200] {
            limiter.try_acquire(at(secs));
        }
        limiter.usage(at(205));

        let long: Vec<_> = limiter.long_window().events().collect();
        assert!(limiter.short_window().events().all(|t| long.contains(&t)));
    }
}
