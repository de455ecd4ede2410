//! Performer: one receive loop for one subscription.
//!
//! Each request is acknowledged only after it has been dispatched, and
//! offsets are committed once `commit_batch_size` acknowledgements have
//! gathered. A failed request is logged, forwarded to the dead-letter
//! channel if one is configured, and acknowledged so it cannot block the
//! channel.

use crate::domain::{ActivatorStats, HandlerRegistry};
use cr_01_correlation_engine::{CorrelationEngine, DispatchError};
use shared_bus::{BusError, MessageConsumer, Subscription};
use shared_types::Message;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Header naming why a message was dead-lettered.
pub const DEAD_LETTER_REASON_HEADER: &str = "x-dead-letter-reason";

/// Header naming the channel a dead-lettered message came from.
pub const ORIGINAL_CHANNEL_HEADER: &str = "x-original-channel";

pub struct Performer {
    id: usize,
    subscription: Subscription,
    consumer: Box<dyn MessageConsumer>,
    engine: Arc<CorrelationEngine>,
    handlers: Arc<HandlerRegistry>,
    stats: Arc<ActivatorStats>,
    shutdown: watch::Receiver<bool>,
}

impl Performer {
    pub fn new(
        id: usize,
        subscription: Subscription,
        consumer: Box<dyn MessageConsumer>,
        engine: Arc<CorrelationEngine>,
        handlers: Arc<HandlerRegistry>,
        stats: Arc<ActivatorStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            subscription,
            consumer,
            engine,
            handlers,
            stats,
            shutdown,
        }
    }

    /// Run until shutdown is signalled or the broker closes, then commit.
    pub async fn run(mut self) {
        info!(
            performer = self.id,
            subscription = %self.subscription.name,
            channel = %self.subscription.channel,
            "Performer started"
        );

        let batch_size = self.subscription.commit_batch_size;
        let poll_timeout = self.subscription.poll_timeout();

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                _ = self.shutdown.changed() => break,
                result = self.consumer.receive(batch_size, poll_timeout) => result,
            };

            match result {
                Ok(batch) => {
                    for request in batch {
                        self.dispatch(request).await;
                    }
                }
                Err(BusError::Closed) => {
                    warn!(performer = self.id, "Broker closed, stopping performer");
                    break;
                }
                Err(e) => {
                    error!(performer = self.id, error = %e, "Error receiving requests");
                }
            }
        }

        self.commit().await;
        info!(
            performer = self.id,
            subscription = %self.subscription.name,
            "Performer stopped"
        );
    }

    async fn dispatch(&mut self, request: Message) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        match self
            .engine
            .on_request_received(&request, self.handlers.as_ref())
            .await
        {
            Ok(()) => {
                self.stats.handled.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    performer = self.id,
                    correlation_id = %request.correlation_id(),
                    channel = %request.channel(),
                    error = %e,
                    "Request failed"
                );
                self.dead_letter(&request, &e).await;
            }
        }

        if let Err(e) = self.consumer.acknowledge(&request) {
            warn!(
                performer = self.id,
                correlation_id = %request.correlation_id(),
                error = %e,
                "Failed to acknowledge request"
            );
        }
        if self.consumer.uncommitted() >= self.subscription.commit_batch_size {
            self.commit().await;
        }
    }

    async fn dead_letter(&mut self, request: &Message, reason: &DispatchError) {
        let Some(channel) = self.subscription.dead_letter_channel.clone() else {
            return;
        };

        let forwarded = request
            .redirected(channel.clone())
            .with_header(DEAD_LETTER_REASON_HEADER, reason.to_string())
            .with_header(ORIGINAL_CHANNEL_HEADER, request.channel().as_str());

        match self
            .engine
            .publish_with_retry(forwarded, &self.engine.config().reply_retry)
            .await
        {
            Ok(()) => {
                self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %request.correlation_id(),
                    channel = %channel,
                    "Request forwarded to dead-letter channel"
                );
            }
            Err(e) => {
                error!(
                    correlation_id = %request.correlation_id(),
                    channel = %channel,
                    error = %e,
                    "Dead-letter forward failed"
                );
            }
        }
    }

    async fn commit(&mut self) {
        if self.consumer.uncommitted() == 0 {
            return;
        }
        match self.consumer.commit().await {
            Ok(count) => {
                self.stats.commits.fetch_add(1, Ordering::Relaxed);
                debug!(performer = self.id, acknowledged = count, "Committed request offsets");
            }
            Err(e) => warn!(performer = self.id, error = %e, "Failed to commit request offsets"),
        }
    }
}
