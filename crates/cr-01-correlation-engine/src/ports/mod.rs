//! Ports layer: what the engine is driven by and what it drives.

pub mod inbound;

pub use inbound::RequestHandler;
