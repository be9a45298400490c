//! Channel-serialized limiter.
//!
//! A single task owns the [`RateLimiter`]; handles send it requests over a
//! bounded queue and wait for the reply. The actor stops once every handle
//! has been dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::clock::{Clock, Timestamp};
use crate::error::{MeterguardError, Result};

use super::backend::AdmissionControl;
use super::decision::{Decision, RateLimited, UsageSnapshot};
use super::limiter::RateLimiter;

/// Default depth of the request queue.
const DEFAULT_QUEUE_DEPTH: usize = 1024;

enum Command {
    Acquire {
        now: Timestamp,
        reply: oneshot::Sender<std::result::Result<(), RateLimited>>,
    },
    Usage {
        now: Timestamp,
        reply: oneshot::Sender<UsageSnapshot>,
    },
}

/// The task that owns the limiter state.
pub struct LimiterActor {
    limiter: RateLimiter,
    receiver: mpsc::Receiver<Command>,
}

/// Cloneable handle for talking to a [`LimiterActor`].
#[derive(Clone)]
pub struct LimiterHandle {
    sender: mpsc::Sender<Command>,
    clock: Arc<dyn Clock>,
}

impl LimiterActor {
    /// Spawn the actor on the current runtime with the default queue depth.
    pub fn spawn(limiter: RateLimiter, clock: Arc<dyn Clock>) -> (LimiterHandle, JoinHandle<()>) {
        Self::spawn_with_capacity(limiter, clock, DEFAULT_QUEUE_DEPTH)
    }

    /// Spawn the actor with an explicit queue depth.
    pub fn spawn_with_capacity(
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> (LimiterHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let actor = LimiterActor { limiter, receiver };
        let task = tokio::spawn(actor.run());
        (LimiterHandle { sender, clock }, task)
    }

    #[instrument(skip(self), name = "limiter_actor")]
    async fn run(mut self) {
        debug!("Limiter actor started");
        let mut handled: u64 = 0;

        while let Some(command) = self.receiver.recv().await {
            handled += 1;
            match command {
                Command::Acquire { now, reply } => {
                    // The caller may have given up; the decision stands either way.
                    let _ = reply.send(self.limiter.check(now));
                }
                Command::Usage { now, reply } => {
                    let _ = reply.send(self.limiter.usage(now));
                }
            }
        }

        info!(handled, "Limiter actor stopped");
    }
}

impl LimiterHandle {
    /// Admission check at the clock's current time.
    pub async fn try_acquire(&self) -> Result<Decision> {
        match self.acquire_at(self.clock.now()).await? {
            Ok(()) => Ok(Decision::Allowed),
            Err(denial) => Ok(Decision::Denied(denial.reason)),
        }
    }

    /// Admission check at an explicit time.
    pub async fn acquire_at(&self, now: Timestamp) -> Result<std::result::Result<(), RateLimited>> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Command::Acquire { now, reply })
            .await
            .map_err(|_| MeterguardError::LimiterUnavailable)?;
        response.await.map_err(|_| MeterguardError::LimiterUnavailable)
    }

    async fn usage_at(&self, now: Timestamp) -> Result<UsageSnapshot> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Command::Usage { now, reply })
            .await
            .map_err(|_| MeterguardError::LimiterUnavailable)?;
        response.await.map_err(|_| MeterguardError::LimiterUnavailable)
    }
}

#[async_trait]
impl AdmissionControl for LimiterHandle {
    async fn admit(&self) -> Result<()> {
        self.acquire_at(self.clock.now())
            .await?
            .map_err(MeterguardError::RateLimited)
    }

    async fn usage(&self) -> Result<UsageSnapshot> {
        self.usage_at(self.clock.now()).await
    }
}
