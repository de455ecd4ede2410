//! Error types for the Correlation Engine.

use shared_bus::BusError;
use shared_types::{ChannelName, CorrelationId, PayloadError};
use thiserror::Error;

/// Failure of a single `call`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// No reply arrived before the deadline.
    #[error("Call {correlation_id} timed out after {timeout_ms}ms")]
    Timeout {
        correlation_id: CorrelationId,
        timeout_ms: u64,
    },

    /// The request could not be handed to the broker.
    #[error("Publish failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: BusError,
    },

    /// A matching reply arrived but could not be turned into the reply type.
    #[error("Reply could not be decoded: {0}")]
    Deserialization(#[source] PayloadError),

    /// The request could not be encoded.
    #[error("Request could not be encoded: {0}")]
    Serialization(#[source] PayloadError),

    /// The correlation id is already outstanding.
    #[error("Correlation id already pending: {0}")]
    DuplicateCorrelationId(CorrelationId),

    /// No publication is configured for the request type.
    #[error("No publication for request type {0}")]
    NoPublication(String),

    /// The reply slot was dropped without an outcome.
    #[error("Reply channel closed")]
    ChannelClosed,
}

/// Why a received request produced no reply.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The message is a reply, not a request.
    #[error("Message {0} is not a request")]
    NotARequest(CorrelationId),

    /// The request does not say where to reply.
    #[error("Request {0} has no reply-to channel")]
    MissingReplyTo(CorrelationId),

    /// The handler rejected or failed the request.
    #[error("Handler failed for {correlation_id}: {source}")]
    Handler {
        correlation_id: CorrelationId,
        #[source]
        source: HandlerError,
    },

    /// The reply could not be published.
    #[error("Reply to {correlation_id} on {channel} not published: {source}")]
    ReplyNotPublished {
        correlation_id: CorrelationId,
        channel: ChannelName,
        #[source]
        source: CallError,
    },
}

/// Errors raised by request handlers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// No handler is registered for the channel or type.
    #[error("No handler for {0}")]
    NoHandler(String),

    /// The request body is not the type the handler expects.
    #[error("Request could not be decoded: {0}")]
    Decode(#[source] PayloadError),

    /// The reply could not be encoded.
    #[error("Reply could not be encoded: {0}")]
    Encode(#[source] PayloadError),

    /// Application failure.
    #[error("{0}")]
    Failed(String),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("Duplicate publication for request type {0}")]
    DuplicatePublication(String),
}

/// Errors raised while starting a requester.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Bus(#[from] BusError),
}
