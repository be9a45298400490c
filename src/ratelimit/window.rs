//! Sliding window event log.

use std::collections::VecDeque;

use chrono::TimeDelta;

use crate::clock::Timestamp;

/// Accepted events inside a trailing window of fixed length.
///
/// Events are kept oldest first. Because events are recorded at observation
/// time, pruning only ever needs to look at the front.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Maximum accepted events inside the window
    limit: u64,
    /// Length of the window
    duration: TimeDelta,
    /// Accepted events, ascending
    events: VecDeque<Timestamp>,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(limit: u64, duration: TimeDelta) -> Self {
        Self {
            limit,
            duration,
            events: VecDeque::new(),
        }
    }

    /// Drop events strictly older than `now - duration`.
    ///
    /// Returns the number of events removed. When the boundary falls before
    /// the earliest representable time nothing can be older, so nothing is removed.
    pub fn prune(&mut self, now: Timestamp) -> usize {
        let Some(boundary) = now.checked_sub_signed(self.duration) else {
            return 0;
        };
        let mut removed = 0;
        while let Some(&oldest) = self.events.front() {
            if oldest < boundary {
                self.events.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    /// Whether the window has no room for another event.
    pub fn is_full(&self) -> bool {
        self.len() >= self.limit
    }

    /// Record an accepted event.
    ///
    /// A timestamp older than the newest recorded event is recorded as the
    /// newest one so the log stays ascending.
    pub fn record(&mut self, at: Timestamp) {
        let at = match self.events.back() {
            Some(&newest) if newest > at => newest,
            _ => at,
        };
        self.events.push_back(at);
    }

    /// Number of events currently held.
    pub fn len(&self) -> u64 {
        self.events.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get the remaining quota.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.len())
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    /// Time from `now` until the window next has room.
    ///
    /// Zero when there is room already. With a limit of zero there is never
    /// room, so the full window length is reported.
    pub fn time_until_available(&self, now: Timestamp) -> TimeDelta {
        if !self.is_full() {
            return TimeDelta::zero();
        }
        // The event that must age out is the one that brings the count below the limit.
        let excess = (self.len() - self.limit) as usize;
        match self.events.get(excess) {
            // Pruning is strict, so the event leaves just after the boundary passes it.
            Some(&blocking) => match blocking.checked_add_signed(self.duration) {
                Some(expires) => (expires - now + TimeDelta::nanoseconds(1)).max(TimeDelta::zero()),
                None => self.duration,
            },
            None => self.duration,
        }
    }

    /// Iterate over the recorded events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &Timestamp> {
        self.events.iter()
    }
}
