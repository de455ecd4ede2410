//! # Message Envelope
//!
//! The wrapper for everything published to a channel.
//!
//! ## Properties
//!
//! - **Versioning**: every header includes a `version` field.
//! - **Correlation**: requests and replies share a `correlation_id`; requests
//!   carry the `reply_to` channel their reply must be published to.
//! - **Typed Body**: the payload is opaque bytes plus a type tag.

use crate::errors::PayloadError;
use crate::identifiers::{ChannelName, CorrelationId, MessageId};
use crate::payload::Payload;
use crate::PROTOCOL_VERSION;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Whether a message asks for something or answers something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Request,
    Reply,
}

/// Routing and correlation metadata of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Envelope version for forward compatibility.
    version: u16,

    /// Unique id of this message.
    id: MessageId,

    /// For requests: a freshly generated id.
    /// For replies: the id from the original request.
    correlation_id: CorrelationId,

    /// Destination channel.
    channel: ChannelName,

    kind: MessageKind,

    /// Channel the reply must be published to. Present on requests only.
    reply_to: Option<ChannelName>,

    /// Milliseconds since the Unix epoch at construction time.
    timestamp_ms: u64,

    /// Free-form string headers.
    bag: BTreeMap<String, String>,
}

/// Opaque payload bytes plus the tag naming their type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    type_tag: String,
    bytes: Bytes,
}

impl MessageBody {
    pub fn new(type_tag: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            type_tag: type_tag.into(),
            bytes: bytes.into(),
        }
    }

    /// Encode a typed value as JSON, tagged with its `TYPE_TAG`.
    pub fn encode<P: Payload>(value: &P) -> Result<Self, PayloadError> {
        let bytes = serde_json::to_vec(value).map_err(|e| PayloadError::Encode(e.to_string()))?;
        Ok(Self::new(P::TYPE_TAG, bytes))
    }

    /// Decode into `P`, refusing bodies tagged with another type.
    pub fn decode<P: Payload>(&self) -> Result<P, PayloadError> {
        if self.type_tag != P::TYPE_TAG {
            return Err(PayloadError::TypeMismatch {
                expected: P::TYPE_TAG.to_string(),
                actual: self.type_tag.clone(),
            });
        }
        serde_json::from_slice(&self.bytes).map_err(|e| PayloadError::Decode(e.to_string()))
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A message as published to or consumed from a channel.
///
/// Fields are private; a `Message` handed to the broker can only be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    header: MessageHeader,
    body: MessageBody,
}

impl Message {
    /// Build a request that expects its reply on `reply_to`.
    pub fn request(
        correlation_id: CorrelationId,
        channel: ChannelName,
        reply_to: ChannelName,
        body: MessageBody,
    ) -> Self {
        Self::build(
            correlation_id,
            channel,
            MessageKind::Request,
            Some(reply_to),
            body,
        )
    }

    /// Build the reply to a request carrying `correlation_id`.
    pub fn reply(correlation_id: CorrelationId, channel: ChannelName, body: MessageBody) -> Self {
        Self::build(correlation_id, channel, MessageKind::Reply, None, body)
    }

    fn build(
        correlation_id: CorrelationId,
        channel: ChannelName,
        kind: MessageKind,
        reply_to: Option<ChannelName>,
        body: MessageBody,
    ) -> Self {
        Self {
            header: MessageHeader {
                version: PROTOCOL_VERSION,
                id: MessageId::new(),
                correlation_id,
                channel,
                kind,
                reply_to,
                timestamp_ms: now_ms(),
                bag: BTreeMap::new(),
            },
            body,
        }
    }

    /// Attach a string header. Consumes the message so a shared instance
    /// is never modified.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.bag.insert(key.into(), value.into());
        self
    }

    /// Copy of this message bound for another channel.
    ///
    /// Keeps correlation, kind, reply-to, headers and body; gets a new id
    /// and timestamp.
    #[must_use]
    pub fn redirected(&self, channel: ChannelName) -> Self {
        let mut header = self.header.clone();
        header.id = MessageId::new();
        header.channel = channel;
        header.timestamp_ms = now_ms();
        Self {
            header,
            body: self.body.clone(),
        }
    }

    pub fn version(&self) -> u16 {
        self.header.version
    }

    pub fn id(&self) -> MessageId {
        self.header.id
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.header.correlation_id
    }

    pub fn channel(&self) -> &ChannelName {
        &self.header.channel
    }

    pub fn kind(&self) -> MessageKind {
        self.header.kind
    }

    pub fn reply_to(&self) -> Option<&ChannelName> {
        self.header.reply_to.as_ref()
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.header.timestamp_ms
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.header.bag.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &MessageHeader {
        &self.header
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn type_tag(&self) -> &str {
        self.body.type_tag()
    }

    pub fn is_request(&self) -> bool {
        self.header.kind == MessageKind::Request
    }

    pub fn is_reply(&self) -> bool {
        self.header.kind == MessageKind::Reply
    }

    /// Shorthand for `self.body().decode::<P>()`.
    pub fn decode<P: Payload>(&self) -> Result<P, PayloadError> {
        self.body.decode()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
