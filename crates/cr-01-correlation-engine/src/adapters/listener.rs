//! Reply listener: drains the reply channel into the correlation engine.

use crate::domain::ReplyDisposition;
use crate::service::CorrelationEngine;
use shared_bus::{BusError, MessageConsumer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Counters reported when the listener stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub resolved: u64,
    pub unmatched: u64,
    pub commits: u64,
}

/// Receive loop for one reply subscription.
pub struct ReplyListener {
    engine: Arc<CorrelationEngine>,
    consumer: Box<dyn MessageConsumer>,
    batch_size: usize,
    poll_timeout: Duration,
    shutdown: watch::Receiver<bool>,
    stats: ListenerStats,
}

impl ReplyListener {
    pub fn new(
        engine: Arc<CorrelationEngine>,
        consumer: Box<dyn MessageConsumer>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let reply = &engine.config().reply;
        let batch_size = reply.commit_batch_size;
        let poll_timeout = reply.poll_timeout();
        Self {
            engine,
            consumer,
            batch_size,
            poll_timeout,
            shutdown,
            stats: ListenerStats::default(),
        }
    }

    /// Run until shutdown is signalled or the broker closes.
    pub async fn run(mut self) -> ListenerStats {
        info!(channel = %self.consumer.channel(), "Reply listener started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                _ = self.shutdown.changed() => break,
                result = self.consumer.receive(self.batch_size, self.poll_timeout) => result,
            };

            match result {
                Ok(batch) => {
                    for message in batch {
                        self.handle_reply(message).await;
                    }
                }
                Err(BusError::Closed) => {
                    warn!("Broker closed, stopping reply listener");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Error receiving replies");
                }
            }
        }

        self.commit().await;
        info!(
            channel = %self.consumer.channel(),
            received = self.stats.received,
            resolved = self.stats.resolved,
            unmatched = self.stats.unmatched,
            "Reply listener stopped"
        );
        self.stats
    }

    async fn handle_reply(&mut self, message: shared_types::Message) {
        self.stats.received += 1;

        match self.engine.on_reply_received(message.clone()) {
            ReplyDisposition::Resolved => self.stats.resolved += 1,
            ReplyDisposition::Unmatched => self.stats.unmatched += 1,
        }

        if let Err(e) = self.consumer.acknowledge(&message) {
            warn!(
                correlation_id = %message.correlation_id(),
                error = %e,
                "Failed to acknowledge reply"
            );
        }
        if self.consumer.uncommitted() >= self.batch_size {
            self.commit().await;
        }
    }

    async fn commit(&mut self) {
        if self.consumer.uncommitted() == 0 {
            return;
        }
        match self.consumer.commit().await {
            Ok(count) => {
                self.stats.commits += 1;
                debug!(acknowledged = count, "Committed reply offsets");
            }
            Err(e) => warn!(error = %e, "Failed to commit reply offsets"),
        }
    }
}
