//! Configuration parsed from environment variables.

use std::time::Duration;

use crate::wall::RefreshPolicy;

pub const ENV_URL: &str = "COMPLAINT_WALL_URL";
pub const ENV_API_KEY: &str = "COMPLAINT_WALL_API_KEY";
pub const ENV_TABLE: &str = "COMPLAINT_WALL_TABLE";
pub const ENV_CHANNEL: &str = "COMPLAINT_WALL_CHANNEL";
pub const ENV_REFRESH: &str = "COMPLAINT_WALL_REFRESH";
pub const ENV_TYPING_TIMEOUT_MS: &str = "COMPLAINT_WALL_TYPING_TIMEOUT_MS";
pub const ENV_TYPING_THROTTLE_MS: &str = "COMPLAINT_WALL_TYPING_THROTTLE_MS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "COMPLAINT_WALL_REQUEST_TIMEOUT_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "COMPLAINT_WALL_CONNECT_TIMEOUT_SECS";

pub const DEFAULT_TABLE: &str = "complaints";
pub const DEFAULT_CHANNEL: &str = "complaint-wall";
pub const DEFAULT_TYPING_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_TYPING_THROTTLE_MS: u64 = 1500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    Missing { var: &'static str },

    #[error("invalid value for {var}: {value}")]
    Parse { var: &'static str, value: String },
}

/// Connection settings for the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Base URL without trailing slash, e.g. `https://abc.supabase.co`.
    pub url: String,
    pub api_key: String,
    pub table: String,
    pub channel: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

/// Behavior of the view state synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallConfig {
    pub refresh: RefreshPolicy,
    /// How long the typing flag stays up after the last signal.
    pub typing_timeout: Duration,
    /// Minimum gap between outgoing typing broadcasts.
    pub typing_broadcast_interval: Duration,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            refresh: RefreshPolicy::FeedEcho,
            typing_timeout: Duration::from_millis(DEFAULT_TYPING_TIMEOUT_MS),
            typing_broadcast_interval: Duration::from_millis(DEFAULT_TYPING_THROTTLE_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` runs against the in-process hub.
    pub feed: Option<FeedConfig>,
    pub wall: WallConfig,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `COMPLAINT_WALL_URL`: hosted backend; offline when absent
    /// - `COMPLAINT_WALL_API_KEY`: required once the URL is set
    /// - `COMPLAINT_WALL_TABLE`: default `complaints`
    /// - `COMPLAINT_WALL_CHANNEL`: default `complaint-wall`
    /// - `COMPLAINT_WALL_REFRESH`: `echo` (default) or `refetch`
    /// - `COMPLAINT_WALL_TYPING_TIMEOUT_MS`: default 3000
    /// - `COMPLAINT_WALL_TYPING_THROTTLE_MS`: default 1500
    /// - `COMPLAINT_WALL_REQUEST_TIMEOUT_SECS`: default 30
    /// - `COMPLAINT_WALL_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a URL without key or an unknown refresh policy.
    pub fn from_env() -> Result<Self, ConfigError> {
        let feed = match non_empty_var(ENV_URL) {
            Some(url) => {
                let api_key = non_empty_var(ENV_API_KEY).ok_or(ConfigError::Missing { var: ENV_API_KEY })?;
                Some(FeedConfig {
                    url: url.trim_end_matches('/').to_string(),
                    api_key,
                    table: non_empty_var(ENV_TABLE).unwrap_or_else(|| DEFAULT_TABLE.to_string()),
                    channel: non_empty_var(ENV_CHANNEL).unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
                    request_timeout: Duration::from_secs(env_parse(ENV_REQUEST_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS)),
                    connect_timeout: Duration::from_secs(env_parse(ENV_CONNECT_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT_SECS)),
                })
            }
            None => None,
        };

        let wall = WallConfig {
            refresh: parse_refresh(std::env::var(ENV_REFRESH).ok().as_deref())?,
            typing_timeout: Duration::from_millis(env_parse(ENV_TYPING_TIMEOUT_MS, DEFAULT_TYPING_TIMEOUT_MS)),
            typing_broadcast_interval: Duration::from_millis(env_parse(
                ENV_TYPING_THROTTLE_MS,
                DEFAULT_TYPING_THROTTLE_MS,
            )),
        };

        Ok(Self { feed, wall })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_refresh(raw: Option<&str>) -> Result<RefreshPolicy, ConfigError> {
    match raw.unwrap_or("echo") {
        "echo" => Ok(RefreshPolicy::FeedEcho),
        "refetch" => Ok(RefreshPolicy::Refetch),
        other => Err(ConfigError::Parse { var: ENV_REFRESH, value: other.to_string() }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
