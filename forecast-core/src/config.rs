use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_WEATHER_API_URL: &str = "https://api.weather.gov";
pub const DEFAULT_USER_AGENT: &str = "forecast-proxy/0.1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 1;
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 20;

pub const PORT_ENV: &str = "PORT";
pub const WEATHER_API_URL_ENV: &str = "WEATHER_API_URL";
pub const WEATHER_API_USER_AGENT_ENV: &str = "WEATHER_API_USER_AGENT";
pub const WEATHER_API_TIMEOUT_SECS_ENV: &str = "WEATHER_API_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const RATE_LIMIT_WINDOW_ENV: &str = "RATE_LIMIT_WINDOW_IN_SECONDS";
pub const RATE_LIMIT_REQUESTS_ENV: &str = "RATE_LIMIT_REQUESTS_PER_WINDOW";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Which forecast period is reported as "current".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeriodSelection {
    /// The first period in upstream order.
    #[default]
    First,
    /// The period whose start time is closest to now.
    Nearest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT, log_format: LogFormat::default() }
    }
}

/// Where and how the weather service is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Sent as `User-Agent` on every forecast request.
    pub user_agent: String,
    pub timeout_secs: u64,
    pub period_selection: PeriodSelection,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WEATHER_API_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            period_selection: PeriodSelection::default(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Per-client request budget, counted in fixed windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Top-level configuration.
///
/// Example TOML:
/// ```toml
/// [server]
/// port = 3000
/// log_format = "json"
///
/// [upstream]
/// base_url = "https://api.weather.gov"
/// timeout_secs = 10
///
/// [rate_limit]
/// window_secs = 60
/// max_requests = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load config from the default location, apply environment overrides and
    /// validate the result.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_with_env(&path, std::env::vars())
    }

    /// Same as [`Config::load`] but from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with_env(path, std::env::vars())
    }

    pub(crate) fn load_with_env<I, K, V>(path: &Path, env: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut cfg = Self::read_file(path)?;
        cfg.apply_env(env)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a config file, or return defaults if it doesn't exist yet.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Overlay values from environment variables.
    pub fn apply_env<I, K, V>(&mut self, env: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> =
            env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let get = |key: &str| map.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(port) = get(PORT_ENV) {
            self.server.port =
                port.parse().with_context(|| format!("{PORT_ENV} must be a port number, got '{port}'"))?;
        }
        if let Some(format) = get(LOG_FORMAT_ENV) {
            self.server.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => bail!("{LOG_FORMAT_ENV} must be 'json' or 'pretty', got '{other}'"),
            };
        }
        if let Some(url) = get(WEATHER_API_URL_ENV) {
            self.upstream.base_url = url.to_string();
        }
        if let Some(agent) = get(WEATHER_API_USER_AGENT_ENV) {
            self.upstream.user_agent = agent.to_string();
        }
        if let Some(secs) = get(WEATHER_API_TIMEOUT_SECS_ENV) {
            self.upstream.timeout_secs = secs.parse().with_context(|| {
                format!("{WEATHER_API_TIMEOUT_SECS_ENV} must be a whole number of seconds, got '{secs}'")
            })?;
        }
        if let Some(secs) = get(RATE_LIMIT_WINDOW_ENV) {
            self.rate_limit.window_secs = secs.parse().with_context(|| {
                format!("{RATE_LIMIT_WINDOW_ENV} must be a whole number of seconds, got '{secs}'")
            })?;
        }
        if let Some(max) = get(RATE_LIMIT_REQUESTS_ENV) {
            self.rate_limit.max_requests = max
                .parse()
                .with_context(|| format!("{RATE_LIMIT_REQUESTS_ENV} must be a whole number, got '{max}'"))?;
        }

        Ok(())
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be between 1 and 65535");
        }

        let url = url::Url::parse(&self.upstream.base_url).with_context(|| {
            format!("Weather API URL must be a valid URL, got '{}'", self.upstream.base_url)
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Weather API URL must use http or https, got '{}'", url.scheme());
        }

        if self.upstream.timeout_secs == 0 {
            bail!("upstream.timeout_secs must be greater than zero");
        }

        if self.rate_limit.window_secs == 0 || self.rate_limit.max_requests == 0 {
            bail!("rate_limit.window_secs and rate_limit.max_requests must be greater than zero");
        }

        Ok(())
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "forecast-proxy", "forecast-api")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
