//! Engine configuration with validation.
//!
//! Every field has a default, so a partial document deserializes.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared_bus::{OffsetReset, Subscription};
use shared_types::ChannelName;
use std::collections::HashSet;
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where replies to this engine's calls are delivered
    pub reply: ReplyConfig,
    /// Timeout used when a call does not name one
    pub default_timeout_ms: u64,
    /// How often abandoned pending calls are swept
    pub sweep_interval_ms: u64,
    /// Retry policy for replies published by the responder side
    pub reply_retry: RetryPolicy,
    /// Where each request type is published
    pub publications: Vec<PublicationConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reply: ReplyConfig::default(),
            default_timeout_ms: 2_000,
            sweep_interval_ms: 1_000,
            reply_retry: RetryPolicy::default(),
            publications: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Add a publication, replacing any existing one for the same type.
    #[must_use]
    pub fn with_publication(mut self, publication: PublicationConfig) -> Self {
        self.publications
            .retain(|p| p.request_type != publication.request_type);
        self.publications.push(publication);
        self
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Publication for a request type tag, if configured.
    pub fn publication_for(&self, request_type: &str) -> Option<&PublicationConfig> {
        self.publications
            .iter()
            .find(|p| p.request_type == request_type)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reply.validate()?;

        if self.default_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "default_timeout_ms cannot be 0".into(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval_ms cannot be 0".into(),
            ));
        }

        self.reply_retry.validate()?;

        let mut seen = HashSet::new();
        for publication in &self.publications {
            publication.validate()?;
            if !seen.insert(publication.request_type.as_str()) {
                return Err(ConfigError::DuplicatePublication(
                    publication.request_type.clone(),
                ));
            }
        }

        Ok(())
    }
}

/// Reply subscription of a requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Subscription name used in logs
    pub subscription_name: String,
    /// Reply channel named in every request's reply-to header
    pub channel: ChannelName,
    /// Consumer group of the reply listener
    pub group_id: String,
    /// Upper bound on one reply poll
    pub poll_timeout_ms: u64,
    /// Acknowledged replies gathered before a commit
    pub commit_batch_size: usize,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            subscription_name: "courier.reply.subscription".to_string(),
            channel: ChannelName::from("courier.reply"),
            group_id: "courier.reply".to_string(),
            poll_timeout_ms: 100,
            commit_batch_size: 5,
        }
    }
}

impl ReplyConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Subscription for the reply listener.
    ///
    /// Replies published before the listener joined belong to no live
    /// call, so a new group starts at the end of the channel.
    pub fn subscription(&self) -> Subscription {
        Subscription::new(
            self.subscription_name.clone(),
            self.channel.clone(),
            self.group_id.clone(),
        )
        .with_poll_timeout(self.poll_timeout())
        .with_commit_batch_size(self.commit_batch_size)
        .with_offset_default(OffsetReset::Latest)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.is_empty() {
            return Err(ConfigError::InvalidChannel(
                "reply channel cannot be empty".into(),
            ));
        }
        self.subscription()
            .validate()
            .map_err(|e| ConfigError::InvalidSubscription(e.to_string()))
    }
}

/// Publish retry policy.
///
/// `max_retries` counts attempts after the first, so the broker sees at
/// most `max_retries + 1` publishes of the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Upper bound on a single publish attempt
    pub message_timeout_ms: u64,
    /// Delay before the first retry
    pub retry_backoff_ms: u64,
    /// Cap on the doubling delay
    pub max_retry_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            message_timeout_ms: 1_000,
            retry_backoff_ms: 50,
            max_retry_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// A policy that publishes once.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    /// Delay before retry number `retry` (1-based), doubling and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let delay = self.retry_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_backoff_ms))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.message_timeout_ms == 0 {
            return Err(ConfigError::InvalidRetryPolicy(
                "message_timeout_ms cannot be 0".into(),
            ));
        }
        if self.retry_backoff_ms > self.max_retry_backoff_ms {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "retry_backoff_ms ({}) exceeds max_retry_backoff_ms ({})",
                self.retry_backoff_ms, self.max_retry_backoff_ms
            )));
        }
        Ok(())
    }
}

/// Where one request type is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationConfig {
    /// Type tag of the request
    pub request_type: String,
    /// Channel the request is published to
    pub topic: ChannelName,
    /// Publish retry policy
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl PublicationConfig {
    pub fn new(request_type: impl Into<String>, topic: impl Into<ChannelName>) -> Self {
        Self {
            request_type: request_type.into(),
            topic: topic.into(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_type.trim().is_empty() {
            return Err(ConfigError::InvalidChannel(
                "publication request_type cannot be empty".into(),
            ));
        }
        if self.topic.is_empty() {
            return Err(ConfigError::InvalidChannel(format!(
                "publication topic for {} cannot be empty",
                self.request_type
            )));
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_timeout(), Duration::from_secs(2));
        assert_eq!(config.reply.poll_timeout(), Duration::from_millis(100));
        assert_eq!(config.reply.commit_batch_size, 5);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 4);
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(200));
        assert_eq!(policy.backoff(5), Duration::from_millis(500));
        assert_eq!(policy.backoff(60), Duration::from_millis(500));
    }

    #[test]
    fn test_publication_lookup_and_replace() {
        let config = EngineConfig::default()
            .with_publication(PublicationConfig::new("greeting.request", "old"))
            .with_publication(PublicationConfig::new("greeting.request", "Greeting.Request"));
        assert_eq!(config.publications.len(), 1);
        assert_eq!(
            config.publication_for("greeting.request").map(|p| p.topic.as_str()),
            Some("Greeting.Request")
        );
        assert!(config.publication_for("unknown").is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.default_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));

        let mut config = EngineConfig::default();
        config.reply.channel = ChannelName::from("");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidChannel(_))));

        let mut config = EngineConfig::default();
        config.reply.commit_batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSubscription(_))
        ));

        let mut config = EngineConfig::default();
        config.reply_retry.retry_backoff_ms = 10_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRetryPolicy(_))
        ));

        let mut config = EngineConfig::default();
        config.publications = vec![
            PublicationConfig::new("a", "x"),
            PublicationConfig::new("a", "y"),
        ];
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicatePublication("a".into()))
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "reply": {"channel": "create.task.reply.channel", "group_id": "iqbal.reply"},
                "publications": [{"request_type": "greeting.request", "topic": "Greeting.Request"}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.reply.channel.as_str(), "create.task.reply.channel");
        assert_eq!(config.reply.poll_timeout_ms, 100);
        assert_eq!(config.default_timeout_ms, 2_000);
        assert_eq!(config.publications[0].retry, RetryPolicy::default());
        assert!(config.validate().is_ok());
    }
}
