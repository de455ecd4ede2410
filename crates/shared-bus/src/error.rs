//! Errors from broker operations.

use shared_types::MessageId;
use thiserror::Error;

/// Errors returned by producers, consumers and consumer factories.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The broker was shut down.
    #[error("Broker closed")]
    Closed,

    /// The broker refused or lost a message.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// A message was acknowledged that this consumer never handed out.
    #[error("Unknown message: {0}")]
    UnknownMessage(MessageId),

    /// The subscription parameters are unusable.
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),
}
