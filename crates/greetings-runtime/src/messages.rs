//! Greetings request and reply payloads.

use serde::{Deserialize, Serialize};
use shared_types::{Call, Payload};

/// Ask for a salutation in a language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingRequest {
    pub name: String,
    /// BCP 47 style tag, e.g. `en-gb`
    pub language: String,
}

impl GreetingRequest {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
        }
    }
}

impl Payload for GreetingRequest {
    const TYPE_TAG: &'static str = "greetings.greeting_request";
}

impl Call for GreetingRequest {
    type Reply = GreetingReply;
}

/// The salutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingReply {
    pub greeting: String,
}

impl Payload for GreetingReply {
    const TYPE_TAG: &'static str = "greetings.greeting_reply";
}
