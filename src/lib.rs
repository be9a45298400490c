//! Meterguard - admission control for metered upstream APIs
//!
//! This crate guards calls to rate-limited third-party APIs (text and image
//! generation, photo search) with a dual sliding-window limiter: a short
//! window bounds bursts, a long window bounds daily volume.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod replay;
pub mod upstream;
