//! # Greetings
//!
//! Starts the Greetings server and client, requests a salutation for
//! "Ian" in "en-gb" and prints the reply.

use anyhow::{Context, Result};
use courier_telemetry::{init_logging, TelemetryConfig};
use greetings_runtime::{GreetingRequest, GreetingsRuntime, RuntimeConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging(&TelemetryConfig::for_service("greetings"))?;

    // Load configuration
    let config = RuntimeConfig::from_env();
    let timeout = config.call_timeout();

    let runtime = GreetingsRuntime::start(config)?;

    info!("Requesting Salutation...");
    let request = GreetingRequest::new("Ian", "en-gb");
    let outcome = runtime.greet(&request, Some(timeout)).await;

    match &outcome {
        Ok(reply) => info!(greeting = %reply.greeting, "Received greeting"),
        Err(e) => error!(error = %e, "Greeting failed"),
    }

    runtime.shutdown().await;
    info!("Done...");

    let reply = outcome.context("Greeting call failed")?;
    println!("{}", reply.greeting);
    Ok(())
}
