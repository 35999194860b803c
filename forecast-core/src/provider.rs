use crate::{Config, Coordinates, SimplifiedForecast, error::ForecastError, provider::nws::NwsService};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

pub mod nws;

/// Forecast lookups as seen by the HTTP layer.
#[async_trait]
pub trait WeatherService: Send + Sync + Debug {
    async fn forecast(&self, coords: Coordinates) -> Result<SimplifiedForecast, ForecastError>;

    /// Readiness of the upstream weather service. Never fails.
    async fn is_healthy(&self) -> bool;
}

/// Construct the weather service described by `config`.
pub fn service_from_config(config: &Config) -> Arc<dyn WeatherService> {
    Arc::new(NwsService::new(config.upstream.clone()))
}
