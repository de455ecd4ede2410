//! # CR-02 Service Activator
//!
//! The responder loop: pulls requests from subscribed channels, hands each
//! one to the correlation engine with the handler registered for its
//! channel, and publishes the reply to the request's reply-to channel.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`)
//!   - `HandlerRegistry`: typed handlers keyed by channel
//!   - `ActivatorStats`: shared performer counters
//!
//! - **Service Layer** (`service/`): `ServiceActivator`
//!
//! - **Adapters Layer** (`adapters/`): `Performer`, one receive loop
//!
//! ## Delivery
//!
//! - A request is acknowledged only after dispatch finished.
//! - Offsets are committed every `commit_batch_size` acknowledgements and
//!   on shutdown.
//! - A failing request is logged, optionally dead-lettered, and does not
//!   stop the loop. Its caller sees a timeout.
//!
//! ## Usage Example
//!
//! ```ignore
//! let mut handlers = HandlerRegistry::new();
//! handlers.register("Greeting.Request", |req: GreetingRequest| async move {
//!     Ok(GreetingReply { greeting: format!("Good morning, {}", req.name) })
//! })?;
//!
//! let activator = ServiceActivator::start(engine, Arc::new(handlers), &[subscription], &broker)?;
//! // ...
//! activator.shutdown().await;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod service;

pub use adapters::performer::{DEAD_LETTER_REASON_HEADER, ORIGINAL_CHANNEL_HEADER};
pub use adapters::Performer;
pub use domain::{ActivatorStats, ActivatorStatsSnapshot, HandlerRegistry, TypedHandler};
pub use error::ActivatorError;
pub use service::ServiceActivator;
