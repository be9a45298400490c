//! Admission control trait for abstracting over how the limiter is shared.

use async_trait::async_trait;

use crate::error::Result;

use super::decision::UsageSnapshot;

/// Trait for shared rate limiter implementations.
///
/// This trait abstracts over both the mutex-guarded `SharedRateLimiter` and
/// the channel-serialized `LimiterHandle` so request handlers can work with
/// either.
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    /// Ask to make one upstream call now.
    ///
    /// Returns `MeterguardError::RateLimited` when a cap is exhausted.
    async fn admit(&self) -> Result<()>;

    /// Current occupancy of both windows.
    async fn usage(&self) -> Result<UsageSnapshot>;
}
