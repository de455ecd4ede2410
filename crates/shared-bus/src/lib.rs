//! # Shared Bus - Broker Boundary for Request/Reply Messaging
//!
//! Defines what the correlation engine and the responder loop need from a
//! message broker, and ships an in-memory broker that honours it.
//!
//! ## Boundary
//!
//! - [`MessageProducer::publish`] hands a message to a named channel.
//! - [`ConsumerFactory::create_consumer`] joins a consumer group on a channel.
//! - [`MessageConsumer`] polls batches with a timeout, acknowledges handled
//!   messages and commits acknowledged offsets.
//!
//! ```text
//! ┌──────────────┐   publish()    ┌──────────────┐   receive()   ┌──────────────┐
//! │  Requester   │ ─────────────→ │    Broker    │ ────────────→ │  Responder   │
//! │              │ ←───────────── │  (channels)  │ ←──────────── │              │
//! └──────────────┘   receive()    └──────────────┘   publish()   └──────────────┘
//! ```
//!
//! ## Delivery
//!
//! - **At-least-once:** a member that leaves gives every message it did not
//!   commit back to its group, and a group's committed offset never passes a
//!   message some member still holds.
//! - **Consumer groups:** members of one group share a single cursor, so a
//!   message is handed to exactly one member.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod in_memory;
pub mod publisher;
pub mod subscriber;
pub mod subscription;

// Re-export main types
pub use error::BusError;
pub use in_memory::{InMemoryBroker, InMemoryConsumer};
pub use publisher::MessageProducer;
pub use subscriber::{ConsumerFactory, MessageConsumer};
pub use subscription::{OffsetReset, Subscription};

/// Default poll timeout for a consumer, in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 500;

/// Default number of acknowledgements gathered before a commit.
pub const DEFAULT_COMMIT_BATCH_SIZE: usize = 10;

/// Consumed messages an in-memory channel keeps before trimming.
pub const DEFAULT_RETAINED_MESSAGES: usize = 10_000;
