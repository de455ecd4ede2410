//! Runtime configuration: the sample's values as defaults, environment
//! overrides on top.

use crate::messages::GreetingRequest;
use cr_01_correlation_engine::{
    ConfigError, EngineConfig, PublicationConfig, ReplyConfig, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use shared_bus::{OffsetReset, Subscription};
use shared_types::{ChannelName, Payload};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

/// Channel Greetings requests are published to.
pub const REQUEST_CHANNEL: &str = "Greeting.Request";

/// Channel the client listens on for replies.
pub const REPLY_CHANNEL: &str = "create.task.reply.channel";

/// Everything the demo runtime needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Client side: reply subscription, publication, call timeout
    pub client: EngineConfig,
    /// Server side: reply publish retries
    pub server: EngineConfig,
    /// Server side: the request subscription
    pub requests: Subscription,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let client = EngineConfig {
            reply: ReplyConfig {
                subscription_name: "create.task.reply.subscription".to_string(),
                channel: ChannelName::from(REPLY_CHANNEL),
                group_id: "iqbal.reply".to_string(),
                poll_timeout_ms: 100,
                commit_batch_size: 5,
            },
            default_timeout_ms: 2_000,
            ..EngineConfig::default()
        }
        .with_publication(
            PublicationConfig::new(GreetingRequest::TYPE_TAG, REQUEST_CHANNEL).with_retry(
                RetryPolicy {
                    max_retries: 3,
                    message_timeout_ms: 1_000,
                    ..RetryPolicy::default()
                },
            ),
        );

        let requests =
            Subscription::new("paramore.example.greeting", REQUEST_CHANNEL, "test.request")
                .with_poll_timeout(Duration::from_millis(500))
                .with_commit_batch_size(350)
                .with_performers(1)
                .with_offset_default(OffsetReset::Earliest);

        Self {
            client,
            server: EngineConfig::default(),
            requests,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment.
    ///
    /// # Environment Variables
    ///
    /// - `COURIER_CALL_TIMEOUT_MS`: Default call timeout (default: 2000)
    /// - `COURIER_PUBLISH_RETRIES`: Request publish retries (default: 3)
    /// - `COURIER_REQUEST_CHANNEL`: Request channel (default: Greeting.Request)
    /// - `COURIER_REPLY_CHANNEL`: Reply channel (default: create.task.reply.channel)
    /// - `COURIER_PERFORMERS`: Server receive loops (default: 1)
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&var, "COURIER_CALL_TIMEOUT_MS") {
            config.client.default_timeout_ms = ms;
        }

        if let Some(retries) = parse_var::<u32>(&var, "COURIER_PUBLISH_RETRIES") {
            for publication in &mut config.client.publications {
                publication.retry.max_retries = retries;
            }
        }

        if let Some(channel) = var("COURIER_REQUEST_CHANNEL") {
            let channel = ChannelName::from(channel);
            for publication in &mut config.client.publications {
                publication.topic = channel.clone();
            }
            config.requests.channel = channel;
        }

        if let Some(channel) = var("COURIER_REPLY_CHANNEL") {
            config.client.reply.channel = ChannelName::from(channel);
        }

        if let Some(performers) = parse_var::<usize>(&var, "COURIER_PERFORMERS") {
            config.requests.no_of_performers = performers;
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client.validate()?;
        self.server.validate()?;
        self.requests
            .validate()
            .map_err(|e| ConfigError::InvalidSubscription(e.to_string()))
    }

    pub fn call_timeout(&self) -> Duration {
        self.client.default_timeout()
    }
}

fn parse_var<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.parse() {
        Ok(value) => {
            info!(key = key, value = %raw, "Loaded setting from environment");
            Some(value)
        }
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}
