//! Domain layer: handler registry and performer statistics.

pub mod registry;
pub mod stats;

pub use registry::{HandlerRegistry, TypedHandler};
pub use stats::{ActivatorStats, ActivatorStatsSnapshot};
