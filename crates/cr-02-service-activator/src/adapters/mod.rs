//! Adapters Layer
//!
//! - `Performer` - One receive loop bound to one subscription

pub mod performer;

pub use performer::Performer;
