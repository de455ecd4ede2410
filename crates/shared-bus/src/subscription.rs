//! # Subscription
//!
//! Consumer parameters for one channel: which group to join, how long to
//! poll, how often to commit and how many performers to run.

use crate::error::BusError;
use crate::{DEFAULT_COMMIT_BATCH_SIZE, DEFAULT_POLL_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use shared_types::ChannelName;
use std::time::Duration;

/// Where a brand new consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetReset {
    /// From the first retained message.
    Earliest,
    /// Only messages published after the group was created.
    #[default]
    Latest,
}

/// Registration of interest in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscription {
    /// Human-readable name used in logs.
    pub name: String,
    /// Channel to consume.
    pub channel: ChannelName,
    /// Consumer group id. Members of one group share the stream.
    pub group_id: String,
    /// Upper bound on a single poll, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Acknowledgements gathered before offsets are committed.
    pub commit_batch_size: usize,
    /// Parallel receive loops for this subscription.
    pub no_of_performers: usize,
    /// Starting point for a group seen for the first time.
    pub offset_default: OffsetReset,
    /// Where messages that failed handling are forwarded, if anywhere.
    pub dead_letter_channel: Option<ChannelName>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            name: "default.subscription".to_string(),
            channel: ChannelName::from("default"),
            group_id: "default.group".to_string(),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            no_of_performers: 1,
            offset_default: OffsetReset::Latest,
            dead_letter_channel: None,
        }
    }
}

impl Subscription {
    pub fn new(
        name: impl Into<String>,
        channel: impl Into<ChannelName>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            channel: channel.into(),
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_commit_batch_size(mut self, size: usize) -> Self {
        self.commit_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_performers(mut self, count: usize) -> Self {
        self.no_of_performers = count;
        self
    }

    #[must_use]
    pub fn with_offset_default(mut self, offset: OffsetReset) -> Self {
        self.offset_default = offset;
        self
    }

    #[must_use]
    pub fn with_dead_letter_channel(mut self, channel: impl Into<ChannelName>) -> Self {
        self.dead_letter_channel = Some(channel.into());
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Validate subscription parameters
    pub fn validate(&self) -> Result<(), BusError> {
        if self.channel.is_empty() {
            return Err(BusError::InvalidSubscription(format!(
                "{}: channel cannot be empty",
                self.name
            )));
        }
        if self.group_id.trim().is_empty() {
            return Err(BusError::InvalidSubscription(format!(
                "{}: group_id cannot be empty",
                self.name
            )));
        }
        if self.poll_timeout_ms == 0 {
            return Err(BusError::InvalidSubscription(format!(
                "{}: poll_timeout_ms cannot be 0",
                self.name
            )));
        }
        if self.commit_batch_size == 0 {
            return Err(BusError::InvalidSubscription(format!(
                "{}: commit_batch_size cannot be 0",
                self.name
            )));
        }
        if self.no_of_performers == 0 {
            return Err(BusError::InvalidSubscription(format!(
                "{}: no_of_performers cannot be 0",
                self.name
            )));
        }
        Ok(())
    }
}
