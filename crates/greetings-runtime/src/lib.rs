//! # Greetings Runtime
//!
//! Wires a Greetings server and a Greetings client onto one in-memory
//! broker.
//!
//! ```text
//! Requester ──GreetingRequest──→ [Greeting.Request] ──→ ServiceActivator
//!     ↑                                                      │
//!     └──────GreetingReply──── [create.task.reply.channel] ←─┘
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Start the server: join `Greeting.Request`, register the handler
//! 3. Start the client: join the reply channel
//! 4. Calls may now be made

pub mod config;
pub mod handler;
pub mod messages;

use anyhow::{Context, Result};
use cr_01_correlation_engine::{CallError, CorrelationEngine, Requester};
use cr_02_service_activator::{ActivatorStatsSnapshot, HandlerRegistry, ServiceActivator};
use shared_bus::InMemoryBroker;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use config::{RuntimeConfig, REPLY_CHANNEL, REQUEST_CHANNEL};
pub use messages::{GreetingReply, GreetingRequest};

/// Greetings client and server sharing a broker.
pub struct GreetingsRuntime {
    broker: InMemoryBroker,
    activator: ServiceActivator,
    requester: Requester,
}

impl GreetingsRuntime {
    /// Start server and client on a fresh broker.
    pub fn start(config: RuntimeConfig) -> Result<Self> {
        Self::start_on(InMemoryBroker::new(), config)
    }

    /// Start server and client on an existing broker.
    pub fn start_on(broker: InMemoryBroker, config: RuntimeConfig) -> Result<Self> {
        config.validate().context("Invalid runtime configuration")?;

        let server_engine = Arc::new(
            CorrelationEngine::new(config.server.clone(), Arc::new(broker.clone()))
                .context("Failed to create server engine")?,
        );
        let mut handlers = HandlerRegistry::new();
        handler::register(&mut handlers, config.requests.channel.clone())
            .context("Failed to register greeting handler")?;

        let activator = ServiceActivator::start(
            server_engine,
            Arc::new(handlers),
            std::slice::from_ref(&config.requests),
            &broker,
        )
        .context("Failed to start greetings server")?;

        let requester = Requester::start(config.client.clone(), Arc::new(broker.clone()), &broker)
            .context("Failed to start greetings client")?;

        info!(
            requests = %config.requests.channel,
            replies = %config.client.reply.channel,
            "Greetings runtime started"
        );

        Ok(Self {
            broker,
            activator,
            requester,
        })
    }

    /// Ask the server for a greeting.
    pub async fn greet(
        &self,
        request: &GreetingRequest,
        timeout: Option<Duration>,
    ) -> Result<GreetingReply, CallError> {
        self.requester.call(request, timeout).await
    }

    pub fn broker(&self) -> &InMemoryBroker {
        &self.broker
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    /// Stop the client, then the server.
    pub async fn shutdown(self) -> ActivatorStatsSnapshot {
        info!("Initiating graceful shutdown...");
        self.requester.shutdown().await;
        let stats = self.activator.shutdown().await;
        self.broker.close();
        info!("Shutdown complete");
        stats
    }
}
