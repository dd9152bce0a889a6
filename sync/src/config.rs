//! Configuration management for the sync layer.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default periodic drain interval.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default data directory for the file backend.
pub const DEFAULT_DATA_DIR: &str = "./tally-data";

/// Sync configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote backend
    pub remote_url: String,
    /// API key sent with every remote request
    pub remote_key: String,
    /// Directory the local store persists to
    pub data_dir: PathBuf,
    /// Catch-all periodic drain interval
    pub sync_interval: Duration,
    /// Upper bound of the retry backoff; unbounded retry when unset
    pub retry_backoff_max: Option<Duration>,
}

impl SyncConfig {
    /// Create a configuration with defaults for everything but the remote.
    pub fn new(remote_url: impl Into<String>, remote_key: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            remote_key: remote_key.into(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            retry_backoff_max: None,
        }
    }

    /// Read a `.env` file if present, then load from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let remote_url = lookup("TALLY_REMOTE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingRemoteUrl)?;

        let remote_key = lookup("TALLY_REMOTE_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingRemoteKey)?;

        let data_dir = lookup("TALLY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let sync_interval = match lookup("TALLY_SYNC_INTERVAL_SECS") {
            Some(raw) => parse_secs(&raw).ok_or(ConfigError::InvalidSyncInterval)?,
            None => DEFAULT_SYNC_INTERVAL,
        };

        let retry_backoff_max = lookup("TALLY_RETRY_BACKOFF_MAX_SECS")
            .map(|raw| parse_secs(&raw).ok_or(ConfigError::InvalidBackoff))
            .transpose()?;

        Ok(Self {
            remote_url: remote_url.trim_end_matches('/').to_string(),
            remote_key,
            data_dir,
            sync_interval,
            retry_backoff_max,
        })
    }
}

fn parse_secs(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TALLY_REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("TALLY_REMOTE_KEY environment variable is required")]
    MissingRemoteKey,

    #[error("Invalid TALLY_SYNC_INTERVAL_SECS value")]
    InvalidSyncInterval,

    #[error("Invalid TALLY_RETRY_BACKOFF_MAX_SECS value")]
    InvalidBackoff,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("TALLY_REMOTE_URL", "https://example.supabase.co/"),
            ("TALLY_REMOTE_KEY", "anon-key"),
        ]))
        .unwrap();

        assert_eq!(config.remote_url, "https://example.supabase.co");
        assert_eq!(config.data_dir, PathBuf::from("./tally-data"));
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert!(config.retry_backoff_max.is_none());
    }

    #[test]
    fn overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("TALLY_REMOTE_URL", "http://localhost:54321"),
            ("TALLY_REMOTE_KEY", "k"),
            ("TALLY_DATA_DIR", "/var/lib/tally"),
            ("TALLY_SYNC_INTERVAL_SECS", "60"),
            ("TALLY_RETRY_BACKOFF_MAX_SECS", "600"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/tally"));
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.retry_backoff_max, Some(Duration::from_secs(600)));
    }

    #[test]
    fn missing_remote() {
        assert!(matches!(
            SyncConfig::from_lookup(lookup(&[("TALLY_REMOTE_KEY", "k")])),
            Err(ConfigError::MissingRemoteUrl)
        ));
        assert!(matches!(
            SyncConfig::from_lookup(lookup(&[("TALLY_REMOTE_URL", "http://x")])),
            Err(ConfigError::MissingRemoteKey)
        ));
    }

    #[test]
    fn invalid_interval() {
        let result = SyncConfig::from_lookup(lookup(&[
            ("TALLY_REMOTE_URL", "http://x"),
            ("TALLY_REMOTE_KEY", "k"),
            ("TALLY_SYNC_INTERVAL_SECS", "0"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidSyncInterval)));
    }
}
