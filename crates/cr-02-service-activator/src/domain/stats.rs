//! Counters shared by all performers of one activator.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ActivatorStats {
    /// Requests taken off a channel
    pub received: AtomicU64,
    /// Requests answered
    pub handled: AtomicU64,
    /// Requests that produced no reply
    pub failed: AtomicU64,
    /// Failed requests forwarded to a dead-letter channel
    pub dead_lettered: AtomicU64,
    /// Offset commits
    pub commits: AtomicU64,
}

impl ActivatorStats {
    pub fn snapshot(&self) -> ActivatorStatsSnapshot {
        ActivatorStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivatorStatsSnapshot {
    pub received: u64,
    pub handled: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub commits: u64,
}
