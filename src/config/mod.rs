use serde::{Deserialize, Serialize};
use std::path::Path;
use std::fs;
use std::time::Duration;
use log::info;
use crate::api::coingecko::DEFAULT_BASE_URL;
use crate::error::{Result, Error};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

// Upper bounds keep durations convertible to chrono and tokio deadlines.
pub const MAX_FRESHNESS_SECS: u64 = 24 * 60 * 60;
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;
pub const MAX_RATE_WINDOW_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS, or `*` for any.
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            allowed_origin: "http://localhost:5173".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub vs_currency: String,
    pub per_page: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            vs_currency: "usd".to_string(),
            per_page: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection string. Empty selects the in-memory store.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub freshness_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { freshness_secs: 60 }
    }
}

impl CacheConfig {
    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_secs as i64)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 15 * 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }

    /// Loads `path` (or the default path when it exists), applies environment
    /// overrides and validates the result.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => {
                info!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        if let Some(origin) = lookup("ALLOWED_ORIGIN") {
            self.server.allowed_origin = origin;
        }
        if let Some(url) = lookup("COINGECKO_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Some(key) = lookup("COINGECKO_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_var("DATABASE_MAX_CONNECTIONS", &max)?;
        }
        if let Some(max) = lookup("RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_var("RATE_LIMIT_MAX_REQUESTS", &max)?;
        }
        if let Some(window) = lookup("RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = parse_var("RATE_LIMIT_WINDOW_SECS", &window)?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(file) = lookup("LOG_FILE") {
            self.logging.file = Some(file);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FRESHNESS_SECS).contains(&self.cache.freshness_secs) {
            return Err(Error::ConfigError(format!(
                "cache.freshness_secs must be between 1 and {}",
                MAX_FRESHNESS_SECS
            )));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&self.scheduler.interval_secs) {
            return Err(Error::ConfigError(format!(
                "scheduler.interval_secs must be between 1 and {}",
                MAX_INTERVAL_SECS
            )));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(Error::ConfigError("rate_limit thresholds must be positive".to_string()));
        }
        if self.rate_limit.window_secs > MAX_RATE_WINDOW_SECS {
            return Err(Error::ConfigError(format!(
                "rate_limit.window_secs cannot exceed {}",
                MAX_RATE_WINDOW_SECS
            )));
        }
        if !(1..=250).contains(&self.upstream.per_page) {
            return Err(Error::ConfigError("upstream.per_page must be between 1 and 250".to_string()));
        }
        if self.upstream.vs_currency.trim().is_empty() {
            return Err(Error::ConfigError("upstream.vs_currency cannot be empty".to_string()));
        }
        reqwest::Url::parse(&self.upstream.base_url)
            .map_err(|e| Error::ConfigError(format!("upstream.base_url is invalid: {}", e)))?;

        let origin = self.server.allowed_origin.as_str();
        if origin != "*" {
            let url = reqwest::Url::parse(origin)
                .map_err(|e| Error::ConfigError(format!("server.allowed_origin is invalid: {}", e)))?;
            let bare = url.path() == "/" && url.query().is_none() && url.fragment().is_none();
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() || !bare {
                return Err(Error::ConfigError(format!(
                    "server.allowed_origin must be an http(s) origin: {}", origin
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::ConfigError(format!("{} has an invalid value '{}': {}", key, value, e)))
}
