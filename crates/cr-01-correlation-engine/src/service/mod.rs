//! Service layer: the correlation engine.

pub mod engine;

pub use engine::CorrelationEngine;
