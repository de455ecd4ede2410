//! Requester: a correlation engine with its reply listener running.

use crate::adapters::listener::{ListenerStats, ReplyListener};
use crate::domain::{cleanup_task, EngineConfig};
use crate::error::{CallError, EngineError};
use crate::service::CorrelationEngine;
use shared_bus::{ConsumerFactory, MessageProducer};
use shared_types::Call;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Makes calls and owns the tasks that complete them.
///
/// The reply subscription is joined before `start` returns, so no reply to
/// a call made afterwards can be missed. Dropping a requester without
/// [`shutdown`](Self::shutdown) still stops both tasks; the listener commits
/// and leaves its group in the background.
pub struct Requester {
    engine: Arc<CorrelationEngine>,
    shutdown_tx: watch::Sender<bool>,
    listener: Option<JoinHandle<ListenerStats>>,
    sweeper: JoinHandle<()>,
}

impl Requester {
    /// Validate `config`, join the reply channel and start listening.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: EngineConfig,
        producer: Arc<dyn MessageProducer>,
        consumers: &dyn ConsumerFactory,
    ) -> Result<Self, EngineError> {
        let subscription = config.reply.subscription();
        let sweep_interval = config.sweep_interval();
        let engine = Arc::new(CorrelationEngine::new(config, producer)?);
        let consumer = consumers.create_consumer(&subscription)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(
            ReplyListener::new(Arc::clone(&engine), consumer, shutdown_rx).run(),
        );
        let sweeper = tokio::spawn(cleanup_task(Arc::clone(engine.pending()), sweep_interval));

        info!(
            subscription = %subscription.name,
            channel = %subscription.channel,
            group = %subscription.group_id,
            "Requester started"
        );

        Ok(Self {
            engine,
            shutdown_tx,
            listener: Some(listener),
            sweeper,
        })
    }

    /// Call with an explicit timeout, or the configured default when `None`.
    pub async fn call<R: Call>(
        &self,
        request: &R,
        timeout: Option<Duration>,
    ) -> Result<R::Reply, CallError> {
        let timeout = timeout.unwrap_or_else(|| self.engine.config().default_timeout());
        self.engine.call(request, timeout).await
    }

    pub fn engine(&self) -> &Arc<CorrelationEngine> {
        &self.engine
    }

    /// Get number of outstanding calls
    pub fn pending_count(&self) -> usize {
        self.engine.pending_count()
    }

    /// Stop the listener, commit what it acknowledged and stop sweeping.
    pub async fn shutdown(mut self) -> ListenerStats {
        self.stop();
        let Some(listener) = self.listener.take() else {
            return ListenerStats::default();
        };

        match listener.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Reply listener task failed");
                ListenerStats::default()
            }
        }
    }

    fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.sweeper.abort();
    }
}

impl Drop for Requester {
    fn drop(&mut self) {
        if self.listener.is_some() {
            debug!("Requester dropped without shutdown, stopping its tasks");
            self.stop();
        }
    }
}
