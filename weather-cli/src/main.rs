//! Binary crate for the `cep-weather` services.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Loading configuration and installing logging/telemetry
//! - Running the gateway or resolver role, or a one-off lookup

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cmd = cli::Cli::parse();
    cmd.run().await
}

/// Logs go to stderr so `lookup` output stays clean on stdout.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
