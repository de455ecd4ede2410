//! # Message Consumer
//!
//! Defines the subscription side of the broker boundary.

use crate::error::BusError;
use crate::subscription::Subscription;
use async_trait::async_trait;
use shared_types::{ChannelName, Message};
use std::time::Duration;

/// One member of a consumer group on one channel.
///
/// Dropping a consumer leaves the group. Messages it was handed but did not
/// commit go back to the group and are delivered to another member, or to
/// the next one to join.
#[async_trait]
pub trait MessageConsumer: Send {
    /// Wait up to `timeout` for messages and return at most `max_messages`.
    ///
    /// # Returns
    ///
    /// - `Ok(batch)` - Possibly empty if the timeout elapsed
    /// - `Err(BusError::Closed)` - The broker was shut down
    async fn receive(
        &mut self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<Message>, BusError>;

    /// Mark a received message as handled. Takes effect on the next commit.
    fn acknowledge(&mut self, message: &Message) -> Result<(), BusError>;

    /// Commit acknowledged offsets for the group.
    ///
    /// Returns the number of acknowledgements the commit covered.
    async fn commit(&mut self) -> Result<usize, BusError>;

    /// Acknowledgements not yet committed.
    fn uncommitted(&self) -> usize;

    /// The channel this consumer reads.
    fn channel(&self) -> &ChannelName;
}

/// Creates consumers for subscriptions.
pub trait ConsumerFactory: Send + Sync {
    /// Join the subscription's consumer group on its channel.
    fn create_consumer(
        &self,
        subscription: &Subscription,
    ) -> Result<Box<dyn MessageConsumer>, BusError>;
}
