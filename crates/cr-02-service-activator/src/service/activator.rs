//! # Service Activator
//!
//! Runs `no_of_performers` performers per subscription. Performers of one
//! subscription join the same consumer group, so the channel's requests are
//! split between them without duplicates.

use crate::adapters::Performer;
use crate::domain::{ActivatorStats, ActivatorStatsSnapshot, HandlerRegistry};
use crate::error::ActivatorError;
use cr_01_correlation_engine::CorrelationEngine;
use shared_bus::{ConsumerFactory, Subscription};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The responder side: performers consuming requests and publishing replies.
pub struct ServiceActivator {
    shutdown_tx: watch::Sender<bool>,
    performers: Vec<JoinHandle<()>>,
    stats: Arc<ActivatorStats>,
}

impl ServiceActivator {
    /// Join every subscription's consumer group and start the performers.
    ///
    /// All consumers are created before any task starts, so a failure leaves
    /// nothing running. Must be called from within a tokio runtime.
    pub fn start(
        engine: Arc<CorrelationEngine>,
        handlers: Arc<HandlerRegistry>,
        subscriptions: &[Subscription],
        consumers: &dyn ConsumerFactory,
    ) -> Result<Self, ActivatorError> {
        if subscriptions.is_empty() {
            return Err(ActivatorError::NoSubscriptions);
        }

        let mut members = Vec::new();
        for subscription in subscriptions {
            subscription.validate()?;
            if !handlers.handles(&subscription.channel) {
                return Err(ActivatorError::NoHandler(subscription.channel.clone()));
            }
            for _ in 0..subscription.no_of_performers {
                members.push((subscription.clone(), consumers.create_consumer(subscription)?));
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ActivatorStats::default());

        let performers = members
            .into_iter()
            .enumerate()
            .map(|(id, (subscription, consumer))| {
                tokio::spawn(
                    Performer::new(
                        id,
                        subscription,
                        consumer,
                        Arc::clone(&engine),
                        Arc::clone(&handlers),
                        Arc::clone(&stats),
                        shutdown_rx.clone(),
                    )
                    .run(),
                )
            })
            .collect::<Vec<_>>();

        info!(
            subscriptions = subscriptions.len(),
            performers = performers.len(),
            "Service activator started"
        );

        Ok(Self {
            shutdown_tx,
            performers,
            stats,
        })
    }

    pub fn performer_count(&self) -> usize {
        self.performers.len()
    }

    pub fn stats(&self) -> ActivatorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Signal every performer, wait for their final commits and report.
    pub async fn shutdown(mut self) -> ActivatorStatsSnapshot {
        let _ = self.shutdown_tx.send(true);

        for performer in std::mem::take(&mut self.performers) {
            if let Err(e) = performer.await {
                warn!(error = %e, "Performer task failed");
            }
        }

        let stats = self.stats.snapshot();
        info!(
            handled = stats.handled,
            failed = stats.failed,
            dead_lettered = stats.dead_lettered,
            "Service activator stopped"
        );
        stats
    }
}

impl Drop for ServiceActivator {
    fn drop(&mut self) {
        if !self.performers.is_empty() {
            debug!("Service activator dropped without shutdown, signalling performers");
            let _ = self.shutdown_tx.send(true);
        }
    }
}
