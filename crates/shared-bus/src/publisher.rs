//! # Message Producer
//!
//! Defines the publishing side of the broker boundary.

use crate::error::BusError;
use async_trait::async_trait;
use shared_types::Message;

/// Trait for publishing messages to a channel.
///
/// The destination is the message's own `channel()`. Implementations may
/// hand the message to a broker immediately or stage it first; callers only
/// rely on the message eventually reaching the broker or an error coming back.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Publish a message to the channel named in its header.
    async fn publish(&self, message: Message) -> Result<(), BusError>;
}
