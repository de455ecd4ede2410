//! # In-Memory Broker
//!
//! A single-process broker with named channels and consumer groups.
//!
//! Each channel is a log addressed by offset. Each consumer group on a
//! channel owns one shared read cursor (`next_offset`) and one committed
//! offset. Members of a group pull from the shared cursor, so no two live
//! members ever hold the same message. The committed offset only moves over
//! a contiguous run of acknowledged offsets, and a member that leaves hands
//! every offset it did not commit back to the group to be delivered again.
//!
//! Once a channel holds more than its retention limit, messages that every
//! group has committed are dropped from the front of the log. Channels that
//! no group reads are never trimmed.
//!
//! Suitable for tests and single-node operation; distributed deployments
//! would use a different implementation (e.g., Kafka).

use crate::error::BusError;
use crate::publisher::MessageProducer;
use crate::subscriber::{ConsumerFactory, MessageConsumer};
use crate::subscription::{OffsetReset, Subscription};
use crate::DEFAULT_RETAINED_MESSAGES;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{ChannelName, Message, MessageId};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// Read position of one consumer group on one channel.
///
/// Every offset a member holds, has acknowledged or has returned is at or
/// above `committed`.
#[derive(Debug, Default)]
struct GroupState {
    /// Next offset handed to any member.
    next_offset: u64,
    /// Everything below this offset is done.
    committed: u64,
    /// Live consumers in the group.
    members: usize,
    /// Committed by a member but not yet contiguous with `committed`.
    settled: BTreeSet<u64>,
    /// Given back by members that left; delivered before new messages.
    returned: BTreeSet<u64>,
}

impl GroupState {
    fn starting_at(offset: u64) -> Self {
        Self {
            next_offset: offset,
            committed: offset,
            ..Self::default()
        }
    }

    /// Record offsets a member committed and advance over the settled prefix.
    fn settle(&mut self, offsets: impl IntoIterator<Item = u64>) {
        for offset in offsets {
            if offset >= self.committed {
                self.settled.insert(offset);
            }
        }
        while self.settled.remove(&self.committed) {
            self.committed += 1;
        }
    }

    /// Take back offsets a departing member never committed.
    fn release(&mut self, offsets: impl IntoIterator<Item = u64>) -> usize {
        let before = self.returned.len();
        self.returned.extend(offsets.into_iter().filter(|o| *o >= self.committed));
        self.returned.len() - before
    }
}

struct ChannelLog {
    /// Offset of the first retained message.
    base: u64,
    messages: VecDeque<Message>,
    groups: HashMap<String, GroupState>,
    /// Bumped on every append or release to wake waiting consumers.
    head: watch::Sender<u64>,
}

impl ChannelLog {
    fn new() -> Self {
        let (head, _) = watch::channel(0);
        Self {
            base: 0,
            messages: VecDeque::new(),
            groups: HashMap::new(),
            head,
        }
    }

    /// Offset the next appended message receives.
    fn end(&self) -> u64 {
        self.base + self.messages.len() as u64
    }

    fn get(&self, offset: u64) -> Option<&Message> {
        offset
            .checked_sub(self.base)
            .and_then(|i| self.messages.get(i as usize))
    }

    fn wake(&self) {
        self.head.send_replace(self.end());
    }

    /// Drop messages every group has committed while over `retention`.
    fn trim(&mut self, retention: usize) {
        if self.messages.len() <= retention {
            return;
        }
        let Some(floor) = self.groups.values().map(|g| g.committed).min() else {
            return;
        };
        let excess = (self.messages.len() - retention) as u64;
        let cut = floor.saturating_sub(self.base).min(excess);
        if cut == 0 {
            return;
        }
        self.messages.drain(..cut as usize);
        self.base += cut;
    }
}

struct BrokerInner {
    channels: Mutex<HashMap<ChannelName, ChannelLog>>,
    closed: AtomicBool,
    messages_published: AtomicU64,
    retention: usize,
}

/// In-memory implementation of the broker boundary.
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    /// Create an empty broker retaining up to [`DEFAULT_RETAINED_MESSAGES`]
    /// consumed messages per channel.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED_MESSAGES)
    }

    /// Create an empty broker that trims consumed messages once a channel
    /// holds more than `retention` of them.
    #[must_use]
    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                channels: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                messages_published: AtomicU64::new(0),
                retention: retention.max(1),
            }),
        }
    }

    /// Join the subscription's consumer group and return the concrete consumer.
    pub fn join(&self, subscription: &Subscription) -> Result<InMemoryConsumer, BusError> {
        subscription.validate()?;
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let mut channels = self.inner.channels.lock();
        let log = channels
            .entry(subscription.channel.clone())
            .or_insert_with(ChannelLog::new);
        let start = match subscription.offset_default {
            OffsetReset::Earliest => log.base,
            OffsetReset::Latest => log.end(),
        };

        let group = log
            .groups
            .entry(subscription.group_id.clone())
            .or_insert_with(|| GroupState::starting_at(start));
        group.members += 1;

        debug!(
            channel = %subscription.channel,
            group = %subscription.group_id,
            members = group.members,
            committed = group.committed,
            returned = group.returned.len(),
            "Consumer joined group"
        );

        Ok(InMemoryConsumer {
            inner: Arc::clone(&self.inner),
            channel: subscription.channel.clone(),
            group_id: subscription.group_id.clone(),
            head_rx: log.head.subscribe(),
            in_flight: HashMap::new(),
            acked: Vec::new(),
        })
    }

    /// Refuse further publishes and wake every waiting consumer.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let channels = self.inner.channels.lock();
        for log in channels.values() {
            log.wake();
        }
        info!("In-memory broker closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Total messages accepted since creation.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.inner.messages_published.load(Ordering::Relaxed)
    }

    /// Number of messages retained on a channel.
    #[must_use]
    pub fn channel_len(&self, channel: &ChannelName) -> usize {
        self.inner
            .channels
            .lock()
            .get(channel)
            .map_or(0, |log| log.messages.len())
    }

    /// Snapshot of every message retained on a channel.
    #[must_use]
    pub fn messages(&self, channel: &ChannelName) -> Vec<Message> {
        self.inner
            .channels
            .lock()
            .get(channel)
            .map(|log| log.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Offset of the oldest retained message on a channel.
    #[must_use]
    pub fn earliest_offset(&self, channel: &ChannelName) -> Option<u64> {
        self.inner.channels.lock().get(channel).map(|log| log.base)
    }

    /// Committed offset of a group, if the group exists.
    #[must_use]
    pub fn committed_offset(&self, channel: &ChannelName, group_id: &str) -> Option<u64> {
        self.inner
            .channels
            .lock()
            .get(channel)
            .and_then(|log| log.groups.get(group_id))
            .map(|group| group.committed)
    }

    /// Live members of a group.
    #[must_use]
    pub fn group_members(&self, channel: &ChannelName, group_id: &str) -> usize {
        self.inner
            .channels
            .lock()
            .get(channel)
            .and_then(|log| log.groups.get(group_id))
            .map_or(0, |group| group.members)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageProducer for InMemoryBroker {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let channel = message.channel().clone();
        let correlation_id = message.correlation_id();

        let offset = {
            let mut channels = self.inner.channels.lock();
            let log = channels
                .entry(channel.clone())
                .or_insert_with(ChannelLog::new);
            let offset = log.end();
            log.messages.push_back(message);
            log.trim(self.inner.retention);
            log.wake();
            offset
        };
        self.inner.messages_published.fetch_add(1, Ordering::Relaxed);

        debug!(
            channel = %channel,
            correlation_id = %correlation_id,
            offset = offset,
            "Message published"
        );
        Ok(())
    }
}

impl ConsumerFactory for InMemoryBroker {
    fn create_consumer(
        &self,
        subscription: &Subscription,
    ) -> Result<Box<dyn MessageConsumer>, BusError> {
        Ok(Box::new(self.join(subscription)?))
    }
}

/// A member of a consumer group on the in-memory broker.
///
/// When dropped, the consumer leaves its group and returns every offset it
/// received but did not commit.
pub struct InMemoryConsumer {
    inner: Arc<BrokerInner>,
    channel: ChannelName,
    group_id: String,
    head_rx: watch::Receiver<u64>,
    /// Offsets of messages handed out and not yet acknowledged.
    in_flight: HashMap<MessageId, u64>,
    /// Acknowledged offsets waiting for the next commit.
    acked: Vec<u64>,
}

impl InMemoryConsumer {
    /// Consumer group this member belongs to.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Messages received and not yet acknowledged.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn take_batch(&mut self, max_messages: usize) -> Vec<Message> {
        let mut channels = self.inner.channels.lock();
        let Some(log) = channels.get_mut(&self.channel) else {
            return Vec::new();
        };
        let end = log.end();
        let Some(group) = log.groups.get_mut(&self.group_id) else {
            return Vec::new();
        };

        let mut offsets = Vec::with_capacity(max_messages);
        while offsets.len() < max_messages {
            match group.returned.pop_first() {
                Some(offset) => offsets.push(offset),
                None => break,
            }
        }
        let fresh_end = end.min(group.next_offset + (max_messages - offsets.len()) as u64);
        offsets.extend(group.next_offset..fresh_end);
        group.next_offset = group.next_offset.max(fresh_end);

        let mut batch = Vec::with_capacity(offsets.len());
        for offset in offsets {
            if let Some(message) = log.get(offset) {
                self.in_flight.insert(message.id(), offset);
                batch.push(message.clone());
            }
        }
        batch
    }
}

#[async_trait]
impl MessageConsumer for InMemoryConsumer {
    async fn receive(
        &mut self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<Message>, BusError> {
        let deadline = Instant::now() + timeout;
        let max_messages = max_messages.max(1);

        loop {
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(BusError::Closed);
            }

            // Mark the current head as seen before looking, so an append
            // racing with the check still wakes `changed()` below.
            let _ = self.head_rx.borrow_and_update();

            let batch = self.take_batch(max_messages);
            if !batch.is_empty() {
                return Ok(batch);
            }

            match tokio::time::timeout_at(deadline, self.head_rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Err(BusError::Closed),
                Err(_) => return Ok(Vec::new()),
            }
        }
    }

    fn acknowledge(&mut self, message: &Message) -> Result<(), BusError> {
        let offset = self
            .in_flight
            .remove(&message.id())
            .ok_or(BusError::UnknownMessage(message.id()))?;
        self.acked.push(offset);
        Ok(())
    }

    async fn commit(&mut self) -> Result<usize, BusError> {
        if self.acked.is_empty() {
            return Ok(0);
        }
        let acked = std::mem::take(&mut self.acked);
        let count = acked.len();

        let committed = {
            let mut channels = self.inner.channels.lock();
            channels.get_mut(&self.channel).and_then(|log| {
                let committed = log.groups.get_mut(&self.group_id).map(|group| {
                    group.settle(acked);
                    group.committed
                });
                log.trim(self.inner.retention);
                committed
            })
        };

        debug!(
            channel = %self.channel,
            group = %self.group_id,
            committed = ?committed,
            acknowledged = count,
            "Offsets committed"
        );
        Ok(count)
    }

    fn uncommitted(&self) -> usize {
        self.acked.len()
    }

    fn channel(&self) -> &ChannelName {
        &self.channel
    }
}

impl Drop for InMemoryConsumer {
    fn drop(&mut self) {
        let mut channels = self.inner.channels.lock();
        let Some(log) = channels.get_mut(&self.channel) else {
            return;
        };
        let Some(group) = log.groups.get_mut(&self.group_id) else {
            return;
        };

        let held = self.in_flight.values().copied().chain(self.acked.iter().copied());
        let returned = group.release(held);
        group.members = group.members.saturating_sub(1);
        debug!(
            channel = %self.channel,
            group = %self.group_id,
            members = group.members,
            returned = returned,
            "Consumer left group"
        );
        if returned > 0 {
            log.wake();
        }
    }
}
