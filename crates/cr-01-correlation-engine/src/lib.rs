//! # CR-01 Correlation Engine
//!
//! Synchronous-style calls over an asynchronous publish/subscribe broker.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): pending call table, configuration
//!   - `PendingCallTable`: outstanding calls keyed by `CorrelationId`
//!   - `EngineConfig`: reply subscription, publications, retry policy
//!
//! - **Ports Layer** (`ports/`): `RequestHandler`, the responder's inbound port
//!
//! - **Service Layer** (`service/`): `CorrelationEngine`
//!   - `call`: register, publish, await reply or deadline
//!   - `on_reply_received`: complete the matching call or drop the reply
//!   - `on_request_received`: run a handler and publish its reply
//!
//! - **Adapters Layer** (`adapters/`): `ReplyListener`, `Requester`
//!
//! ## Invariants
//!
//! - A correlation id is never outstanding twice.
//! - A call is completed at most once. Removing it from the table is the
//!   point of decision between reply, timeout and publish failure.
//! - A call is registered before its request is published.
//! - A timed-out call leaves no entry behind; its late reply is discarded.
//!
//! ## Usage Example
//!
//! ```ignore
//! use cr_01_correlation_engine::{EngineConfig, PublicationConfig, Requester};
//! use shared_bus::InMemoryBroker;
//! use std::sync::Arc;
//!
//! let broker = InMemoryBroker::new();
//! let config = EngineConfig::default()
//!     .with_publication(PublicationConfig::new("greeting.request", "Greeting.Request"));
//! let requester = Requester::start(config, Arc::new(broker.clone()), &broker)?;
//!
//! let reply = requester.call(&request, Some(Duration::from_secs(2))).await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{ListenerStats, ReplyListener, Requester};
pub use domain::{
    cleanup_task, CallOutcome, EngineConfig, PendingCallTable, PendingStats,
    PendingStatsSnapshot, PublicationConfig, ReplyConfig, ReplyDisposition, RetryPolicy,
};
pub use error::{CallError, ConfigError, DispatchError, EngineError, HandlerError};
pub use ports::RequestHandler;
pub use service::CorrelationEngine;
