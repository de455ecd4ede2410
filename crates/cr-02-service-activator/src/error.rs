//! Error types for the Service Activator.

use shared_bus::BusError;
use shared_types::ChannelName;
use thiserror::Error;

/// Errors raised while wiring or starting the responder.
#[derive(Debug, Error)]
pub enum ActivatorError {
    #[error("Handler already registered for channel {0}")]
    DuplicateHandler(ChannelName),

    #[error("No handler registered for channel {0}")]
    NoHandler(ChannelName),

    #[error("No subscriptions to activate")]
    NoSubscriptions,

    #[error("Broker error: {0}")]
    Bus(#[from] BusError),
}
