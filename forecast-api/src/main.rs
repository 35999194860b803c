//! Binary crate for the `forecast-api` service.
//!
//! This crate focuses on:
//! - Parsing CLI arguments and loading configuration
//! - Serving the HTTP routes and translating errors into responses
//! - Per-client rate limiting
//! - Logging setup

use clap::Parser;

mod cli;
mod error;
mod limit;
mod logging;
mod routes;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    cmd.run().await
}
