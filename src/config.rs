use reqwest::Url;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Webhooks accept at most this many embeds per message
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    MissingVariable(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Settings file holding the checkpoint, webhook URL and bounds
    pub settings_path: String,
    /// Minutely replication directory (contains `state.txt`)
    pub replication_url: Url,
    /// OSM API v0.6 base, used for changeset and user lookups
    pub api_url: Url,
    /// OSM website base, used for links in notifications
    pub web_url: Url,
    /// Overrides `webhookUrl` from the settings file when set
    pub webhook_url: Option<String>,
    pub max_batch_width: u64,
    pub fetch_concurrency: usize,
    pub enrich_concurrency: usize,
    pub delivery_chunk_size: usize,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub http_max_retries: u32,
}

impl FeedConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `DIFFWATCH_SETTINGS_PATH` (default: settings.json)
    /// - `REPLICATION_URL` (default: https://planet.openstreetmap.org/replication/minute/)
    /// - `OSM_API_URL` (default: https://api.openstreetmap.org/api/0.6/)
    /// - `OSM_WEB_URL` (default: https://www.openstreetmap.org/)
    /// - `WEBHOOK_URL` (default: taken from the settings file)
    /// - `MAX_BATCH_WIDTH` (default: 5)
    /// - `FETCH_CONCURRENCY` (default: MAX_BATCH_WIDTH)
    /// - `ENRICH_CONCURRENCY` (default: 10)
    /// - `DELIVERY_CHUNK_SIZE` (default: 10, at most 10)
    /// - `POLL_INTERVAL_SECS` (default: 60)
    /// - `HTTP_TIMEOUT_SECS` (default: 30)
    /// - `HTTP_MAX_RETRIES` (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings_path =
            lookup("DIFFWATCH_SETTINGS_PATH").unwrap_or_else(|| "settings.json".to_string());

        let replication_url = parse_base_url(
            "REPLICATION_URL",
            lookup("REPLICATION_URL"),
            "https://planet.openstreetmap.org/replication/minute/",
        )?;
        let api_url = parse_base_url(
            "OSM_API_URL",
            lookup("OSM_API_URL"),
            "https://api.openstreetmap.org/api/0.6/",
        )?;
        let web_url = parse_base_url(
            "OSM_WEB_URL",
            lookup("OSM_WEB_URL"),
            "https://www.openstreetmap.org/",
        )?;

        let webhook_url = lookup("WEBHOOK_URL").filter(|s| !s.trim().is_empty());

        let max_batch_width: u64 = parse_var(&lookup, "MAX_BATCH_WIDTH", 5)?;
        if max_batch_width == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_BATCH_WIDTH must be at least 1".to_string(),
            ));
        }

        let fetch_concurrency: usize =
            parse_var(&lookup, "FETCH_CONCURRENCY", max_batch_width as usize)?;
        let enrich_concurrency: usize = parse_var(&lookup, "ENRICH_CONCURRENCY", 10)?;
        if fetch_concurrency == 0 || enrich_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "FETCH_CONCURRENCY and ENRICH_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let delivery_chunk_size: usize =
            parse_var(&lookup, "DELIVERY_CHUNK_SIZE", MAX_EMBEDS_PER_MESSAGE)?;
        if !(1..=MAX_EMBEDS_PER_MESSAGE).contains(&delivery_chunk_size) {
            return Err(ConfigError::InvalidValue(format!(
                "DELIVERY_CHUNK_SIZE must be between 1 and {}, got {}",
                MAX_EMBEDS_PER_MESSAGE, delivery_chunk_size
            )));
        }

        let poll_interval_secs: u64 = parse_var(&lookup, "POLL_INTERVAL_SECS", 60)?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "POLL_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }

        let http_timeout_secs: u64 = parse_var(&lookup, "HTTP_TIMEOUT_SECS", 30)?;
        if http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "HTTP_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            settings_path,
            replication_url,
            api_url,
            web_url,
            webhook_url,
            max_batch_width,
            fetch_concurrency,
            enrich_concurrency,
            delivery_chunk_size,
            poll_interval: Duration::from_secs(poll_interval_secs),
            http_timeout: Duration::from_secs(http_timeout_secs),
            http_max_retries: parse_var(&lookup, "HTTP_MAX_RETRIES", 3)?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("{} must be a number, got {:?}", key, raw))
        }),
    }
}

/// Parse an http(s) base URL, forcing a trailing slash so joins append
pub(crate) fn parse_base_url(
    key: &str,
    raw: Option<String>,
    default: &str,
) -> Result<Url, ConfigError> {
    let mut raw = raw.unwrap_or_else(|| default.to_string());
    if !raw.ends_with('/') {
        raw.push('/');
    }

    let url = Url::parse(&raw)
        .map_err(|e| ConfigError::InvalidValue(format!("{} is not a valid URL: {}", key, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidValue(format!(
            "{} must start with http:// or https://",
            key
        )));
    }
    Ok(url)
}
