use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    client::HttpClient,
    config::{PeriodSelection, UpstreamConfig},
    error::{FetchError, ForecastError, UpstreamError},
    model::{Coordinates, ForecastPeriod, ForecastResult, PointsResult, SimplifiedForecast},
};

use super::WeatherService;

/// Operation name attached to every forecast failure.
pub const GET_FORECAST: &str = "getForecast";

/// National Weather Service (api.weather.gov) backed forecasts.
#[derive(Debug, Clone)]
pub struct NwsService {
    upstream: UpstreamConfig,
    http: HttpClient,
}

impl NwsService {
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self { upstream, http: HttpClient::new() }
    }

    /// Resolve the forecast URL for `coords`, fetch its periods and reduce the
    /// current one to a [`SimplifiedForecast`].
    #[instrument(skip_all, fields(coordinates = %coords), level = "info")]
    pub async fn resolve_forecast(
        &self,
        coords: Coordinates,
    ) -> Result<SimplifiedForecast, ForecastError> {
        let coordinates = coords.to_string();
        info!("Getting forecast for coordinates: {coordinates}");

        match self.fetch(&coordinates).await {
            Ok(forecast) => {
                info!("Successfully retrieved forecast for {coordinates}");
                Ok(forecast)
            }
            Err(err) => {
                let err = normalize(err, &coordinates);
                warn!(error = %err, "forecast lookup failed");
                Err(err)
            }
        }
    }

    /// Whether the weather service answers its base URL with 200.
    pub async fn is_service_healthy(&self) -> bool {
        info!("Checking weather service health");
        let status = self.http.ping(self.upstream.base_url(), self.upstream.timeout()).await;

        if status == 200 {
            info!("Weather service is healthy");
            return true;
        }

        error!(status, "Weather service is unhealthy");
        false
    }

    async fn fetch(&self, coordinates: &str) -> Result<SimplifiedForecast, FetchError> {
        let agent = Some(self.upstream.user_agent.as_str());
        let timeout = self.upstream.timeout();

        let url = format!("{}/points/{coordinates}", self.upstream.base_url());
        debug!("Fetching points data from: {url}");
        let points: PointsResult = self.http.get_validated(&url, agent, timeout).await?;

        debug!("Fetching forecast from: {}", points.forecast_url);
        let forecast: ForecastResult =
            self.http.get_validated(&points.forecast_url, agent, timeout).await?;

        let period = select_period(&forecast, self.upstream.period_selection, Utc::now());

        Ok(SimplifiedForecast::from_parts(period, &points))
    }
}

#[async_trait]
impl WeatherService for NwsService {
    async fn forecast(&self, coords: Coordinates) -> Result<SimplifiedForecast, ForecastError> {
        self.resolve_forecast(coords).await
    }

    async fn is_healthy(&self) -> bool {
        self.is_service_healthy().await
    }
}

/// Map hop failures onto the caller-facing taxonomy. HTTP and shape failures
/// become [`UpstreamError`]s carrying the coordinates; anything else is left
/// for the caller to treat as internal.
fn normalize(err: FetchError, coordinates: &str) -> ForecastError {
    match err {
        FetchError::Validation(cause) => UpstreamError::new(
            503,
            format!("Weather service returned invalid data format for coordinates {coordinates}"),
            GET_FORECAST,
        )
        .with_coordinates(coordinates)
        .with_cause(cause)
        .into(),
        FetchError::Http(cause) => UpstreamError::new(
            cause.status,
            format!("Failed to get weather forecast for coordinates {coordinates}"),
            GET_FORECAST,
        )
        .with_coordinates(coordinates)
        .with_cause(cause)
        .into(),
        other => ForecastError::Internal(other),
    }
}

/// Pick the period reported as current. Upstream lists periods in
/// chronological order, so `First` is normally the one in progress.
fn select_period(
    forecast: &ForecastResult,
    selection: PeriodSelection,
    now: DateTime<Utc>,
) -> &ForecastPeriod {
    match selection {
        PeriodSelection::First => forecast.first(),
        PeriodSelection::Nearest => forecast
            .periods()
            .filter_map(|p| {
                let start = DateTime::parse_from_rfc3339(&p.start_time).ok()?;
                Some((p, (start.with_timezone(&Utc) - now).num_seconds().abs()))
            })
            .min_by_key(|(_, distance)| *distance)
            .map_or(forecast.first(), |(p, _)| p),
    }
}
