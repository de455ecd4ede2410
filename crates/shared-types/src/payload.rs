//! # Payload Traits
//!
//! Typed values carried in a [`crate::MessageBody`].

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can travel in a message body.
///
/// `TYPE_TAG` is written next to the encoded bytes so that a receiver can
/// tell which type it is looking at before decoding.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable, wire-visible type name.
    const TYPE_TAG: &'static str;
}

/// A request that expects exactly one reply of type `Reply`.
pub trait Call: Payload {
    type Reply: Payload;
}
