//! Core library for the forecast proxy.
//!
//! This crate defines:
//! - Configuration loading and validation
//! - A bounded HTTP client with structured failures
//! - Shape validation of upstream responses
//! - The two-hop National Weather Service lookup and feel classification
//!
//! It is used by `forecast-api`, but can also be reused by other binaries or services.

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod validate;

pub use client::HttpClient;
pub use config::{Config, LogFormat, PeriodSelection, RateLimitConfig, ServerConfig, UpstreamConfig};
pub use error::{FetchError, ForecastError, HttpError, Issue, UpstreamCause, UpstreamError, ValidationError};
pub use model::{Coordinates, Feel, SimplifiedForecast, TemperatureUnit};
pub use provider::{WeatherService, nws::NwsService, service_from_config};
