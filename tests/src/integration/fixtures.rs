//! Shared wiring for the integration scenarios.

use cr_01_correlation_engine::{CorrelationEngine, EngineConfig, RetryPolicy};
use cr_02_service_activator::{HandlerRegistry, ServiceActivator};
use greetings_runtime::{handler, RuntimeConfig};
use shared_bus::{InMemoryBroker, MessageProducer, Subscription};
use std::sync::Arc;
use std::time::Duration;

/// Retries short enough for tests.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        message_timeout_ms: 200,
        retry_backoff_ms: 1,
        max_retry_backoff_ms: 5,
    }
}

/// The Greetings configuration with quick polls.
pub fn runtime_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.requests.poll_timeout_ms = 20;
    config.client.reply.poll_timeout_ms = 20;
    for publication in &mut config.client.publications {
        publication.retry = fast_retry(2);
    }
    config
}

/// Client-side engine configuration.
pub fn client_config() -> EngineConfig {
    runtime_config().client
}

/// Request subscription of the Greetings server.
pub fn request_subscription() -> Subscription {
    runtime_config().requests
}

/// Start the Greetings server on `broker`.
pub fn start_server(broker: &InMemoryBroker, subscription: Subscription) -> ServiceActivator {
    let engine = Arc::new(
        CorrelationEngine::new(EngineConfig::default(), Arc::new(broker.clone())).unwrap(),
    );
    let mut handlers = HandlerRegistry::new();
    handler::register(&mut handlers, subscription.channel.clone()).unwrap();
    ServiceActivator::start(engine, Arc::new(handlers), &[subscription], broker).unwrap()
}

/// Wait until `condition` holds, polling every few milliseconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Producer handle that exposes the broker as a trait object.
pub fn producer(broker: &InMemoryBroker) -> Arc<dyn MessageProducer> {
    Arc::new(broker.clone())
}
