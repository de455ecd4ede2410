//! Adapters Layer
//!
//! Connects the engine to the broker boundary.
//!
//! - `ReplyListener` - Consumes the reply channel and feeds the engine
//! - `Requester` - Engine plus listener, ready to make calls

pub mod listener;
pub mod requester;

pub use listener::{ListenerStats, ReplyListener};
pub use requester::Requester;
