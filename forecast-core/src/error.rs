//! Error taxonomy shared by the HTTP client, the orchestrator and the
//! boundary layer.

use std::fmt;

use thiserror::Error;

/// A failed upstream HTTP exchange: non-success status, unreadable error
/// body, or an elapsed deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HttpError {
    pub status: u16,
    pub message: String,
    pub title: Option<String>,
    pub detail: Option<String>,
    pub correlation_id: Option<String>,
    pub url: Option<String>,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            title: None,
            detail: None,
            correlation_id: None,
            url: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.status == 408
    }
}

/// One failed check, addressed by its field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub path: Vec<String>,
    pub message: String,
}

impl Issue {
    pub fn path_string(&self) -> String {
        self.path.join(".")
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return f.write_str(&self.message);
        }
        write!(f, "{} is {}", self.path_string(), self.message)
    }
}

/// A value that did not match its expected shape. Carries every issue found,
/// not only the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub issues: Vec<Issue>,
}

impl ValidationError {
    /// Human-readable `"<path> is <reason>"` lines, one per issue.
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(Issue::to_string).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

/// What went wrong underneath an [`UpstreamError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamCause {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failure talking to the weather service, with enough context to tell the
/// caller which lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub status: u16,
    pub message: String,
    pub operation: String,
    pub coordinates: Option<String>,
    #[source]
    pub cause: Option<UpstreamCause>,
}

impl UpstreamError {
    pub fn new(status: u16, message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            operation: operation.into(),
            coordinates: None,
            cause: None,
        }
    }

    pub fn with_coordinates(mut self, coordinates: impl Into<String>) -> Self {
        self.coordinates = Some(coordinates.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<UpstreamCause>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Outcome of a single bounded fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("invalid response shape: {0}")]
    Validation(#[from] ValidationError),

    /// Connection, DNS, TLS or similar faults, passed through as-is.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("response body is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure of a forecast lookup as seen by the boundary layer.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Faults the orchestrator does not classify. Treated as internal errors.
    #[error(transparent)]
    Internal(FetchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_renders_path_and_reason() {
        let issue = Issue {
            path: vec!["properties".into(), "forecast".into()],
            message: "Invalid URL".into(),
        };
        assert_eq!(issue.to_string(), "properties.forecast is Invalid URL");
    }

    #[test]
    fn validation_error_lists_every_issue() {
        let err = ValidationError {
            issues: vec![
                Issue { path: vec!["lat".into()], message: "Required".into() },
                Issue { path: vec!["lng".into()], message: "Required".into() },
            ],
        };
        assert_eq!(err.messages(), vec!["lat is Required", "lng is Required"]);
        assert_eq!(err.to_string(), "lat is Required; lng is Required");
    }

    #[test]
    fn upstream_error_keeps_cause_as_source() {
        use std::error::Error as _;

        let http = HttpError::new(404, "HTTP 404: Not Found").with_url("http://x/points/1,2");
        let err = UpstreamError::new(404, "Failed", "getForecast")
            .with_coordinates("1,2")
            .with_cause(http.clone());

        assert_eq!(err.cause, Some(UpstreamCause::Http(http)));
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("HTTP 404: Not Found"));
    }

    #[test]
    fn timeout_is_detected_by_status() {
        assert!(HttpError::new(408, "Request timeout").is_timeout());
        assert!(!HttpError::new(500, "HTTP Error: 500").is_timeout());
    }
}
