use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{RawQuery, Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use forecast_core::{Coordinates, RateLimitConfig, SimplifiedForecast, WeatherService};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::{Instrument, Level, span};
use url::form_urlencoded;

use crate::error::AppError;
use crate::limit::{RateLimiter, limit_requests};

#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<dyn WeatherService>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(service: Arc<dyn WeatherService>, rate_limit: &RateLimitConfig) -> Self {
        Self { service, limiter: Arc::new(RateLimiter::new(rate_limit)) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/weather/forecast", get(forecast))
        .layer(middleware::from_fn_with_state(state.limiter.clone(), limit_requests))
        .layer(middleware::from_fn(request_span))
        .layer(cors())
        .with_state(state)
}

/// Any origin and any header, GET only, no credentials.
fn cors() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods([Method::GET]).allow_headers(Any)
}

/// Run each request inside a span naming its method and path, so events
/// logged while handling it (including error translation) carry both.
async fn request_span(req: Request, next: Next) -> Response {
    let span = span!(Level::INFO, "request", method = %req.method(), path = %req.uri().path());
    next.run(req).instrument(span).await
}

async fn health_live() -> Json<Value> {
    Json(json!({ "message": "Service is up and running" }))
}

async fn health_ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.service.is_healthy().await {
        (StatusCode::OK, Json(json!({ "message": "Service is ready to use" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "message": "Service is not ready to use" })))
    }
}

async fn forecast(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<SimplifiedForecast>, AppError> {
    let query = query.unwrap_or_default();
    let lat = query_value(&query, "lat");
    let lng = query_value(&query, "lng");

    let coords = Coordinates::from_query(lat.as_deref(), lng.as_deref())?;
    let forecast = state.service.forecast(coords).await?;
    Ok(Json(forecast))
}

/// Value of `key` in a raw query string. A repeated key yields its values
/// joined by commas, which then fails number coercion like any other junk.
fn query_value(query: &str, key: &str) -> Option<String> {
    let values: Vec<String> = form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .collect();

    (!values.is_empty()).then(|| values.join(","))
}
