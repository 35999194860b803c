use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use forecast_core::{Config, Coordinates, ForecastError, service_from_config};

use crate::{logging, server};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "forecast-api", version, about = "Simplified weather forecast proxy")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (the default).
    Serve {
        /// Port to listen on; overrides config and `PORT`.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Look up one forecast and print it as JSON.
    #[command(allow_negative_numbers = true)]
    Forecast {
        /// Latitude, -90..90.
        lat: String,
        /// Longitude, -180..180.
        lng: String,
    },

    /// Check whether the weather service is reachable.
    Health,

    /// Write the effective configuration to the config file.
    Configure,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        logging::init(config.server.log_format);

        match self.command.unwrap_or(Command::Serve { port: None }) {
            Command::Serve { port } => {
                if let Some(port) = port {
                    config.server.port = port;
                }
                config.validate()?;
                server::serve(&config).await?;
            }
            Command::Forecast { lat, lng } => {
                let coords = Coordinates::from_query(Some(&lat), Some(&lng))
                    .map_err(|err| anyhow::anyhow!("Invalid coordinates: {err}"))?;

                let forecast = match service_from_config(&config).forecast(coords).await {
                    Ok(forecast) => forecast,
                    Err(ForecastError::Upstream(err)) => {
                        bail!("{} (status {}, operation {})", err, err.status, err.operation)
                    }
                    Err(err) => return Err(err.into()),
                };

                let out = serde_json::to_string_pretty(&forecast)
                    .context("Failed to serialize forecast")?;
                println!("{out}");
            }
            Command::Health => {
                if !service_from_config(&config).is_healthy().await {
                    bail!("Weather service at {} is not ready", config.upstream.base_url());
                }
                println!("Weather service at {} is ready", config.upstream.base_url());
            }
            Command::Configure => {
                let path = match self.config {
                    Some(path) => path,
                    None => Config::config_file_path()?,
                };
                config.save(&path)?;
                println!("Wrote configuration to {}", path.display());
            }
        }

        Ok(())
    }
}
