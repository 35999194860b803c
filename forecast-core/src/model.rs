use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::validate::{self, Checker, Shape};

/// Rendered for city and state when the location is absent.
pub const UNKNOWN_PLACE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build from already-numeric values, checking the ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        let mut c = Checker::new();
        let lat = c.at("lat", |c| in_range(c, latitude, 90.0, "Latitude"));
        let lng = c.at("lng", |c| in_range(c, longitude, 180.0, "Longitude"));
        c.finish(lat.zip(lng)).map(|(latitude, longitude)| Self { latitude, longitude })
    }

    /// Build from raw query-string values, coercing numeric strings.
    pub fn from_query(lat: Option<&str>, lng: Option<&str>) -> Result<Self, ValidationError> {
        let mut c = Checker::new();
        let lat = c.at("lat", |c| coerce(c, lat).and_then(|v| in_range(c, v, 90.0, "Latitude")));
        let lng = c.at("lng", |c| coerce(c, lng).and_then(|v| in_range(c, v, 180.0, "Longitude")));
        c.finish(lat.zip(lng)).map(|(latitude, longitude)| Self { latitude, longitude })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_number(f, self.latitude)?;
        f.write_str(",")?;
        write_number(f, self.longitude)
    }
}

/// Shortest round-trip form, with `-0` written as `0` and magnitudes below
/// 1e-6 in exponent form (`1e-7`), so upstream URLs match the usual JSON
/// rendering of the number.
fn write_number(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value == 0.0 {
        f.write_str("0")
    } else if value.abs() < 1e-6 {
        write!(f, "{value:e}")
    } else {
        write!(f, "{value}")
    }
}

fn coerce(c: &mut Checker, raw: Option<&str>) -> Option<f64> {
    let Some(raw) = raw else {
        c.fail("Required");
        return None;
    };

    // An empty string coerces to zero, like a numeric cast would.
    let trimmed = raw.trim();
    let parsed = if trimmed.is_empty() { Some(0.0) } else { trimmed.parse::<f64>().ok() };

    match parsed {
        Some(v) if v.is_finite() => Some(v),
        _ => {
            c.fail("Expected number, received NaN");
            None
        }
    }
}

fn in_range(c: &mut Checker, value: f64, bound: f64, label: &str) -> Option<f64> {
    if (-bound..=bound).contains(&value) {
        Some(value)
    } else {
        c.fail(format!("{label} must be between -{bound} and {bound}"));
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeLocation {
    pub city: String,
    pub state: String,
}

/// First hop: the `/points/<lat>,<lng>` resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsResult {
    pub forecast_url: String,
    pub location: Option<RelativeLocation>,
}

impl PointsResult {
    /// `"<city>, <state>"`, with placeholders when the upstream omitted the
    /// location.
    pub fn location_label(&self) -> String {
        match &self.location {
            Some(loc) => format!("{}, {}", loc.city, loc.state),
            None => format!("{UNKNOWN_PLACE}, {UNKNOWN_PLACE}"),
        }
    }
}

impl Shape for PointsResult {
    fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let mut c = Checker::new();

        let out = validate::object(&mut c, value).and_then(|root| {
            c.field(root, "properties", |c, props| {
                let props = validate::object(c, props)?;
                let forecast_url = c.field(props, "forecast", validate::url);
                let location = c.optional_field(props, "relativeLocation", relative_location);
                Some(Self { forecast_url: forecast_url?, location: location? })
            })
        });

        c.finish(out)
    }
}

fn relative_location(c: &mut Checker, value: &Value) -> Option<RelativeLocation> {
    let obj = validate::object(c, value)?;
    c.field(obj, "properties", |c, props| {
        let props = validate::object(c, props)?;
        let city = c.field(props, "city", validate::string);
        let state = c.field(props, "state", validate::string);
        Some(RelativeLocation { city: city?, state: state? })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[serde(rename = "F")]
    Fahrenheit,
    #[serde(rename = "C")]
    Celsius,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPeriod {
    pub number: f64,
    pub name: String,
    pub temperature: f64,
    pub unit: TemperatureUnit,
    pub start_time: String,
    pub short_forecast: String,
}

impl ForecastPeriod {
    /// Date part (`YYYY-MM-DD`) of the start time.
    pub fn date(&self) -> &str {
        self.start_time.split('T').next().unwrap_or_default()
    }
}

fn period(c: &mut Checker, value: &Value) -> Option<ForecastPeriod> {
    let obj = validate::object(c, value)?;

    let number = c.field(obj, "number", validate::number);
    let name = c.field(obj, "name", validate::string);
    let temperature = c.field(obj, "temperature", validate::number);
    let start_time = c.field(obj, "startTime", validate::offset_timestamp);
    let unit = c.field(obj, "temperatureUnit", |c, v| validate::one_of(c, v, &["F", "C"]));
    let short_forecast = c.field(obj, "shortForecast", validate::string);

    Some(ForecastPeriod {
        number: number?,
        name: name?,
        temperature: temperature?,
        unit: match unit?.as_str() {
            "F" => TemperatureUnit::Fahrenheit,
            _ => TemperatureUnit::Celsius,
        },
        start_time: start_time?,
        short_forecast: short_forecast?,
    })
}

/// Second hop: the forecast resource. Periods keep upstream order and there
/// is always at least one.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    first: ForecastPeriod,
    rest: Vec<ForecastPeriod>,
}

impl ForecastResult {
    pub fn first(&self) -> &ForecastPeriod {
        &self.first
    }

    pub fn periods(&self) -> impl Iterator<Item = &ForecastPeriod> {
        std::iter::once(&self.first).chain(&self.rest)
    }
}

impl Shape for ForecastResult {
    fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let mut c = Checker::new();

        let out = validate::object(&mut c, value).and_then(|root| {
            c.field(root, "properties", |c, props| {
                let props = validate::object(c, props)?;
                c.field(props, "periods", |c, v| {
                    c.array(v, 1, "At least one forecast period is required", period)
                })
            })
        });

        let out = out.and_then(|periods| {
            let mut periods = periods.into_iter();
            Some(Self { first: periods.next()?, rest: periods.collect() })
        });

        c.finish(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feel {
    Hot,
    Cold,
    Moderate,
}

impl Feel {
    pub fn classify(temperature: f64, unit: TemperatureUnit) -> Self {
        let (hot, cold) = match unit {
            TemperatureUnit::Fahrenheit => (80.0, 50.0),
            TemperatureUnit::Celsius => (27.0, 10.0),
        };

        if temperature >= hot {
            Feel::Hot
        } else if temperature <= cold {
            Feel::Cold
        } else {
            Feel::Moderate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feel::Hot => "hot",
            Feel::Cold => "cold",
            Feel::Moderate => "moderate",
        }
    }
}

impl fmt::Display for Feel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the proxy returns to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifiedForecast {
    pub feel: Feel,
    pub forecast: String,
    pub location: String,
    pub date: String,
}

impl SimplifiedForecast {
    pub fn from_parts(period: &ForecastPeriod, points: &PointsResult) -> Self {
        Self {
            feel: Feel::classify(period.temperature, period.unit),
            forecast: period.short_forecast.clone(),
            location: points.location_label(),
            date: period.date().to_string(),
        }
    }
}
