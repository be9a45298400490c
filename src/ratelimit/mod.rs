//! Rate limiting logic and state management.

mod actor;
mod backend;
mod decision;
mod limiter;
mod registry;
mod shared;
mod window;

pub use actor::{LimiterActor, LimiterHandle};
pub use backend::AdmissionControl;
pub use decision::{Decision, DenialReason, RateLimited, UsageSnapshot, TOO_MANY_REQUESTS};
pub use limiter::RateLimiter;
pub use registry::LimiterRegistry;
pub use shared::SharedRateLimiter;
pub use window::SlidingWindow;
