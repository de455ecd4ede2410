//! Pending Call Table - bridges asynchronous replies back to waiting callers.
//!
//! Flow:
//! 1. `call` generates a CorrelationId and calls `register()` for a receiver
//! 2. `call` publishes the request carrying the CorrelationId
//! 3. The reply listener calls `resolve()` with the reply message
//! 4. `call` awaits the receiver or gives up with `expire()`
//!
//! Removal from the table decides the outcome: whichever of `resolve`,
//! `expire` or `cancel` removes the entry wins, the others see nothing.

use crate::error::CallError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shared_types::{CorrelationId, Message, PayloadError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a waiting caller eventually receives.
pub type CallOutcome = Result<Message, CallError>;

/// Result of offering a reply to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// The reply completed an outstanding call.
    Resolved,
    /// No outstanding call matches; the reply was discarded.
    Unmatched,
}

/// A call waiting for its reply
struct PendingCall {
    /// Slot for the outcome
    sender: oneshot::Sender<CallOutcome>,
    /// Type tag the reply must carry
    expected_type: &'static str,
    /// When the call was registered
    created_at: Instant,
    /// When the caller stops waiting
    deadline: Instant,
}

/// Statistics for the pending call table
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total calls registered
    pub total_registered: AtomicU64,
    /// Total calls completed by a reply
    pub total_completed: AtomicU64,
    /// Total calls that hit their deadline
    pub total_timeouts: AtomicU64,
    /// Total calls withdrawn (publish failure or caller gone)
    pub total_cancelled: AtomicU64,
    /// Total replies that matched nothing
    pub total_unmatched: AtomicU64,
}

impl PendingStats {
    /// Copy of the current counters.
    pub fn snapshot(&self) -> PendingStatsSnapshot {
        PendingStatsSnapshot {
            registered: self.total_registered.load(Ordering::Relaxed),
            completed: self.total_completed.load(Ordering::Relaxed),
            timeouts: self.total_timeouts.load(Ordering::Relaxed),
            cancelled: self.total_cancelled.load(Ordering::Relaxed),
            unmatched: self.total_unmatched.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PendingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingStatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub unmatched: u64,
}

/// Table of outstanding calls keyed by correlation id.
pub struct PendingCallTable {
    pending: DashMap<CorrelationId, PendingCall>,
    stats: Arc<PendingStats>,
}

impl PendingCallTable {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Register a call and get the receiver its outcome will arrive on.
    ///
    /// Refuses an id that is already outstanding.
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        expected_type: &'static str,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<CallOutcome>, CallError> {
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();

        match self.pending.entry(correlation_id) {
            Entry::Occupied(_) => {
                warn!(correlation_id = %correlation_id, "Correlation id already pending");
                return Err(CallError::DuplicateCorrelationId(correlation_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingCall {
                    sender: tx,
                    expected_type,
                    created_at: now,
                    deadline: now + timeout,
                });
            }
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = %correlation_id,
            expected_type = expected_type,
            timeout_ms = timeout.as_millis() as u64,
            "Registered pending call"
        );

        Ok(rx)
    }

    /// Complete the call a reply belongs to.
    ///
    /// A reply whose type tag differs from the expected one still completes
    /// the call, with `CallError::Deserialization`.
    pub fn resolve(&self, reply: Message) -> ReplyDisposition {
        let correlation_id = reply.correlation_id();

        let Some((_, call)) = self.pending.remove(&correlation_id) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %correlation_id,
                channel = %reply.channel(),
                "Reply for unknown or expired correlation id"
            );
            return ReplyDisposition::Unmatched;
        };

        let response_time = call.created_at.elapsed();
        let outcome = if reply.type_tag() == call.expected_type {
            Ok(reply)
        } else {
            warn!(
                correlation_id = %correlation_id,
                expected = call.expected_type,
                actual = reply.type_tag(),
                "Reply type does not match the call"
            );
            Err(CallError::Deserialization(PayloadError::TypeMismatch {
                expected: call.expected_type.to_string(),
                actual: reply.type_tag().to_string(),
            }))
        };

        match call.sender.send(outcome) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    response_time_ms = response_time.as_millis() as u64,
                    "Completed pending call"
                );
            }
            Err(_) => {
                // Caller dropped its future
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %correlation_id, "Pending call receiver dropped");
            }
        }
        ReplyDisposition::Resolved
    }

    /// Remove a call whose deadline passed.
    ///
    /// Returns false if a reply already took it.
    pub fn expire(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Withdraw a call without an outcome.
    ///
    /// Returns false if a reply already took it.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Remove calls past their deadline or whose caller went away.
    ///
    /// Callers normally remove their own entry; this catches futures that
    /// were dropped mid-wait. Returns the number of calls removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, call| {
            if call.sender.is_closed() {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                removed += 1;
                false
            } else if now >= call.deadline {
                warn!(
                    correlation_id = %id,
                    elapsed_ms = now.duration_since(call.created_at).as_millis() as u64,
                    "Removing expired pending call"
                );
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    /// Get number of outstanding calls
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a correlation id is outstanding
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for PendingCallTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that sweeps abandoned calls.
pub async fn cleanup_task(table: Arc<PendingCallTable>, interval: Duration) {
    let mut sweep = tokio::time::interval(interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep.tick().await;
        let removed = table.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Swept abandoned pending calls");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ChannelName, MessageBody};

    fn reply(correlation_id: CorrelationId, type_tag: &str) -> Message {
        Message::reply(
            correlation_id,
            ChannelName::from("replies"),
            MessageBody::new(type_tag, br#"{"greeting":"hi"}"#.to_vec()),
        )
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let table = PendingCallTable::new();
        let id = CorrelationId::new();

        let rx = table
            .register(id, "greeting.reply", Duration::from_secs(30))
            .unwrap();
        assert!(table.is_pending(&id));
        assert_eq!(table.pending_count(), 1);

        let sent = reply(id, "greeting.reply");
        assert_eq!(table.resolve(sent.clone()), ReplyDisposition::Resolved);

        let received = rx.await.unwrap().unwrap();
        assert_eq!(received, sent);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_registration_refused() {
        let table = PendingCallTable::new();
        let id = CorrelationId::new();

        let _rx = table.register(id, "t", Duration::from_secs(1)).unwrap();
        assert_eq!(
            table.register(id, "t", Duration::from_secs(1)).err(),
            Some(CallError::DuplicateCorrelationId(id))
        );
        assert_eq!(table.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_reply_leaves_others() {
        let table = PendingCallTable::new();
        let id = CorrelationId::new();
        let _rx = table.register(id, "t", Duration::from_secs(30)).unwrap();

        assert_eq!(
            table.resolve(reply(CorrelationId::new(), "t")),
            ReplyDisposition::Unmatched
        );
        assert!(table.is_pending(&id));
        assert_eq!(table.stats().snapshot().unmatched, 1);
    }

    #[tokio::test]
    async fn test_type_mismatch_resolves_with_error() {
        let table = PendingCallTable::new();
        let id = CorrelationId::new();
        let rx = table
            .register(id, "greeting.reply", Duration::from_secs(30))
            .unwrap();

        assert_eq!(
            table.resolve(reply(id, "farewell.reply")),
            ReplyDisposition::Resolved
        );
        assert!(matches!(
            rx.await.unwrap(),
            Err(CallError::Deserialization(PayloadError::TypeMismatch { .. }))
        ));
        assert!(!table.is_pending(&id));
    }

    #[tokio::test]
    async fn test_expire_and_late_reply() {
        let table = PendingCallTable::new();
        let id = CorrelationId::new();
        let _rx = table.register(id, "t", Duration::from_millis(1)).unwrap();

        assert!(table.expire(&id));
        assert!(!table.expire(&id));
        assert_eq!(table.resolve(reply(id, "t")), ReplyDisposition::Unmatched);

        let stats = table.stats().snapshot();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.completed, 0);
    }

    #[tokio::test]
    async fn test_cancel() {
        let table = PendingCallTable::new();
        let id = CorrelationId::new();
        let _rx = table.register(id, "t", Duration::from_secs(30)).unwrap();

        assert!(table.cancel(&id));
        assert!(!table.is_pending(&id));
        // Cancel again should return false
        assert!(!table.cancel(&id));
        assert_eq!(table.stats().snapshot().cancelled, 1);
    }

    #[tokio::test]
    async fn test_remove_expired() {
        let table = PendingCallTable::new();
        let short = CorrelationId::new();
        let long = CorrelationId::new();
        let dropped = CorrelationId::new();

        let _rx1 = table.register(short, "t", Duration::from_millis(5)).unwrap();
        let _rx2 = table.register(long, "t", Duration::from_secs(30)).unwrap();
        drop(table.register(dropped, "t", Duration::from_secs(30)).unwrap());

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(table.remove_expired(), 2);
        assert!(!table.is_pending(&short));
        assert!(!table.is_pending(&dropped));
        assert!(table.is_pending(&long));

        let stats = table.stats().snapshot();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps() {
        let table = Arc::new(PendingCallTable::new());
        let id = CorrelationId::new();
        let _rx = table.register(id, "t", Duration::from_millis(5)).unwrap();

        let sweeper = tokio::spawn(cleanup_task(Arc::clone(&table), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(60)).await;
        sweeper.abort();

        assert_eq!(table.pending_count(), 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_replies_resolve_exactly_their_call(
            names in proptest::collection::vec("[a-z]{1,8}", 1..32)
        ) {
            let table = PendingCallTable::new();
            let mut calls: Vec<_> = names
                .iter()
                .map(|name| {
                    let id = CorrelationId::new();
                    let rx = table.register(id, "t", Duration::from_secs(30)).unwrap();
                    (id, name.clone(), rx)
                })
                .collect();

            for (id, name, _) in calls.iter().rev() {
                let reply = Message::reply(
                    *id,
                    ChannelName::from("replies"),
                    MessageBody::new("t", name.clone().into_bytes()),
                );
                proptest::prop_assert_eq!(table.resolve(reply.clone()), ReplyDisposition::Resolved);
                proptest::prop_assert_eq!(table.resolve(reply), ReplyDisposition::Unmatched);
            }

            for (id, name, rx) in calls.iter_mut() {
                let got = rx.try_recv().unwrap().unwrap();
                proptest::prop_assert_eq!(got.correlation_id(), *id);
                proptest::prop_assert_eq!(got.body().bytes(), name.as_bytes());
            }
            proptest::prop_assert_eq!(table.pending_count(), 0);
        }
    }
}
