//! # Courier Telemetry
//!
//! Structured logging for Courier services.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use courier_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_service("greetings");
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `COURIER_LOG_LEVEL` | `info` | Log filter, falls back to `RUST_LOG` |
//! | `COURIER_JSON_LOGS` | `false` | JSON lines instead of pretty output |
//! | `COURIER_CONSOLE_OUTPUT` | `true` | Write logs to stdout at all |
//! | `COURIER_SERVICE_NAME` | `courier` | Name on the startup line |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}
