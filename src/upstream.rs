//! Guarding calls to a metered upstream API.
//!
//! A request handler wraps each upstream call in [`UpstreamGuard::call`].
//! Admission is asked first; a refused call never reaches the upstream.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::MeterguardError;
use crate::ratelimit::{AdmissionControl, RateLimited, TOO_MANY_REQUESTS};

/// HTTP status for a failed upstream call.
const BAD_GATEWAY: u16 = 502;
/// HTTP status when admission control itself is down.
const SERVICE_UNAVAILABLE: u16 = 503;

/// Why a guarded call did not produce a value.
#[derive(Error, Debug)]
pub enum GuardError<E> {
    /// Admission control refused the call or was unavailable
    #[error(transparent)]
    Admission(MeterguardError),

    /// The upstream was called and failed
    #[error("Upstream call failed: {0}")]
    Upstream(E),
}

impl<E> GuardError<E> {
    /// The rate limit denial, if that is why the call was refused.
    pub fn rate_limited(&self) -> Option<&RateLimited> {
        match self {
            GuardError::Admission(err) => err.as_rate_limited(),
            GuardError::Upstream(_) => None,
        }
    }

    /// HTTP status a handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            GuardError::Admission(MeterguardError::RateLimited(_)) => TOO_MANY_REQUESTS,
            GuardError::Admission(_) => SERVICE_UNAVAILABLE,
            GuardError::Upstream(_) => BAD_GATEWAY,
        }
    }
}

/// Admission control in front of one named upstream.
pub struct UpstreamGuard<A: AdmissionControl> {
    /// Upstream name, for logs
    name: String,
    /// The admission control instance
    admission: Arc<A>,
}

impl<A: AdmissionControl> Clone for UpstreamGuard<A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            admission: self.admission.clone(),
        }
    }
}

impl<A: AdmissionControl> UpstreamGuard<A> {
    /// Create a guard for the named upstream.
    pub fn new(name: impl Into<String>, admission: Arc<A>) -> Self {
        Self {
            name: name.into(),
            admission,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn admission(&self) -> &Arc<A> {
        &self.admission
    }

    /// Run `call` if admission control allows it.
    #[instrument(skip(self, call), fields(upstream = %self.name))]
    pub async fn call<F, Fut, T, E>(&self, call: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(err) = self.admission.admit().await {
            match err.as_rate_limited() {
                Some(denial) => debug!(
                    reason = %denial.reason,
                    retry_after_secs = denial.retry_after_secs(),
                    "Upstream call refused"
                ),
                None => warn!(error = %err, "Admission control unavailable"),
            }
            return Err(GuardError::Admission(err));
        }

        debug!("Upstream call admitted");
        call().await.map_err(GuardError::Upstream)
    }
}
