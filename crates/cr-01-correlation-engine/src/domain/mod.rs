//! Domain layer: the pending call table and engine configuration.

pub mod config;
pub mod pending;

pub use config::{EngineConfig, PublicationConfig, ReplyConfig, RetryPolicy};
pub use pending::{
    cleanup_task, CallOutcome, PendingCallTable, PendingStats, PendingStatsSnapshot,
    ReplyDisposition,
};
