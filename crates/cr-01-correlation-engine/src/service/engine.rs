//! # Correlation Engine
//!
//! Turns publish/subscribe messaging into awaitable calls.
//!
//! A call registers its correlation id before the request is published, so
//! a reply that arrives while `publish` is still running (or even from
//! inside it) finds the call waiting. The call's deadline covers the whole
//! exchange, publish retries included.

use crate::domain::{
    CallOutcome, EngineConfig, PendingCallTable, PendingStats, PublicationConfig,
    ReplyDisposition, RetryPolicy,
};
use crate::error::{CallError, ConfigError, DispatchError};
use crate::ports::RequestHandler;
use shared_bus::{BusError, MessageProducer};
use shared_types::{Call, ChannelName, CorrelationId, Message, MessageBody, Payload};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Correlates requests with replies over a [`MessageProducer`].
///
/// The requester side uses [`call`](Self::call) and feeds replies in through
/// [`on_reply_received`](Self::on_reply_received). The responder side uses
/// [`on_request_received`](Self::on_request_received).
pub struct CorrelationEngine {
    pending: Arc<PendingCallTable>,
    producer: Arc<dyn MessageProducer>,
    config: EngineConfig,
}

impl CorrelationEngine {
    pub fn new(
        config: EngineConfig,
        producer: Arc<dyn MessageProducer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            pending: Arc::new(PendingCallTable::new()),
            producer,
            config,
        })
    }

    /// Publish `request` and wait up to `timeout` for its reply.
    ///
    /// # Errors
    ///
    /// - `Timeout` - no reply before the deadline; the call is forgotten
    /// - `Transport` - the request could not be published
    /// - `Deserialization` - the reply does not decode as `R::Reply`
    pub async fn call<R: Call>(
        &self,
        request: &R,
        timeout: Duration,
    ) -> Result<R::Reply, CallError> {
        let publication = self
            .config
            .publication_for(R::TYPE_TAG)
            .ok_or_else(|| CallError::NoPublication(R::TYPE_TAG.to_string()))?;
        let body = MessageBody::encode(request).map_err(CallError::Serialization)?;

        let reply = self
            .exchange(publication, body, <R::Reply as Payload>::TYPE_TAG, timeout)
            .await?;

        reply
            .decode::<R::Reply>()
            .map_err(CallError::Deserialization)
    }

    async fn exchange(
        &self,
        publication: &PublicationConfig,
        body: MessageBody,
        expected_type: &'static str,
        timeout: Duration,
    ) -> Result<Message, CallError> {
        let deadline = Instant::now() + timeout;
        let correlation_id = CorrelationId::new();
        let mut rx = self.pending.register(correlation_id, expected_type, timeout)?;

        let request = Message::request(
            correlation_id,
            publication.topic.clone(),
            self.config.reply.channel.clone(),
            body,
        );

        let publish = self.publish_with_retry(request, &publication.retry);
        let published = tokio::time::timeout_at(deadline, publish).await;
        match published {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if self.pending.cancel(&correlation_id) {
                    return Err(e);
                }
                // A reply took the call; its sender is about to deliver
                return rx.await.unwrap_or(Err(e));
            }
            Err(_) => return self.timed_out(correlation_id, timeout, rx).await,
        }

        debug!(
            correlation_id = %correlation_id,
            channel = %publication.topic,
            timeout_ms = timeout.as_millis() as u64,
            "Sent request"
        );

        let received = tokio::time::timeout_at(deadline, &mut rx).await;
        match received {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CallError::ChannelClosed),
            Err(_) => self.timed_out(correlation_id, timeout, rx).await,
        }
    }

    async fn timed_out(
        &self,
        correlation_id: CorrelationId,
        timeout: Duration,
        rx: oneshot::Receiver<CallOutcome>,
    ) -> Result<Message, CallError> {
        let timed_out = CallError::Timeout {
            correlation_id,
            timeout_ms: timeout.as_millis() as u64,
        };
        if self.pending.expire(&correlation_id) {
            warn!(
                correlation_id = %correlation_id,
                timeout_ms = timeout.as_millis() as u64,
                "Call timed out"
            );
            Err(timed_out)
        } else {
            // The reply won the race with the deadline. Its resolver has
            // removed the entry and sends or drops the sender right after.
            rx.await.unwrap_or(Err(timed_out))
        }
    }

    /// Offer a message from the reply channel to the outstanding calls.
    ///
    /// Replies that match nothing are logged and dropped.
    pub fn on_reply_received(&self, reply: Message) -> ReplyDisposition {
        if !reply.is_reply() {
            self.pending
                .stats()
                .total_unmatched
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                correlation_id = %reply.correlation_id(),
                channel = %reply.channel(),
                "Ignoring non-reply message on reply channel"
            );
            return ReplyDisposition::Unmatched;
        }
        self.pending.resolve(reply)
    }

    /// Run `handler` on a request and publish its reply.
    ///
    /// The reply carries the request's correlation id and goes to the
    /// request's reply-to channel. Nothing is published when the handler
    /// fails.
    pub async fn on_request_received<H>(
        &self,
        request: &Message,
        handler: &H,
    ) -> Result<(), DispatchError>
    where
        H: RequestHandler + ?Sized,
    {
        let correlation_id = request.correlation_id();
        if !request.is_request() {
            return Err(DispatchError::NotARequest(correlation_id));
        }
        let reply_to = request
            .reply_to()
            .cloned()
            .ok_or(DispatchError::MissingReplyTo(correlation_id))?;

        let body = handler
            .handle(request)
            .await
            .map_err(|source| DispatchError::Handler {
                correlation_id,
                source,
            })?;

        let reply = Message::reply(correlation_id, reply_to.clone(), body);
        self.publish_with_retry(reply, &self.config.reply_retry)
            .await
            .map_err(|source| DispatchError::ReplyNotPublished {
                correlation_id,
                channel: reply_to.clone(),
                source,
            })?;

        debug!(
            correlation_id = %correlation_id,
            channel = %reply_to,
            "Sent reply"
        );
        Ok(())
    }

    /// Publish with a per-attempt timeout, retrying with exponential backoff.
    ///
    /// A closed broker is not retried.
    pub async fn publish_with_retry(
        &self,
        message: Message,
        policy: &RetryPolicy,
    ) -> Result<(), CallError> {
        let attempts = policy.attempts();
        let mut last_error = BusError::Closed;

        for attempt in 1..=attempts {
            let publish = self.producer.publish(message.clone());
            let result = tokio::time::timeout(policy.message_timeout(), publish).await;

            match result {
                Ok(Ok(())) => {
                    if attempt > 1 {
                        info!(
                            correlation_id = %message.correlation_id(),
                            attempt = attempt,
                            "Publish succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                Ok(Err(BusError::Closed)) => {
                    return Err(CallError::Transport {
                        attempts: attempt,
                        source: BusError::Closed,
                    });
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = BusError::PublishFailed(format!(
                        "no acknowledgement within {}ms",
                        policy.message_timeout_ms
                    ));
                }
            }

            if attempt < attempts {
                let delay = policy.backoff(attempt);
                warn!(
                    correlation_id = %message.correlation_id(),
                    channel = %message.channel(),
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Publish failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            correlation_id = %message.correlation_id(),
            channel = %message.channel(),
            attempts = attempts,
            error = %last_error,
            "Publish failed, giving up"
        );
        Err(CallError::Transport {
            attempts,
            source: last_error,
        })
    }

    /// Get number of outstanding calls
    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    /// Check if a correlation id is outstanding
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.is_pending(correlation_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        self.pending.stats()
    }

    /// Shared handle to the pending call table.
    pub fn pending(&self) -> &Arc<PendingCallTable> {
        &self.pending
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Channel named in the reply-to header of every request.
    pub fn reply_channel(&self) -> &ChannelName {
        &self.config.reply.channel
    }
}
