//! # Shared Types Crate
//!
//! This crate contains the message envelope, the identifiers and the payload
//! traits used by every participant in a request/reply exchange.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: everything that crosses a channel is defined here.
//! - **Immutable Envelope**: a [`Message`] cannot be mutated once it is shared;
//!   builder-style methods consume `self`.
//! - **Correlation**: requests and replies are matched by [`CorrelationId`],
//!   replies are routed by the request's `reply_to` channel.

pub mod envelope;
pub mod errors;
pub mod identifiers;
pub mod payload;

pub use envelope::{Message, MessageBody, MessageHeader, MessageKind};
pub use errors::PayloadError;
pub use identifiers::{ChannelName, CorrelationId, MessageId};
pub use payload::{Call, Payload};

/// Current envelope version.
pub const PROTOCOL_VERSION: u16 = 1;
