//! Client configuration
//!
//! Loads connection, reconnect and heartbeat settings from an optional TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default chat server endpoint
pub const DEFAULT_URL: &str = "ws://localhost:8765";

/// Default maximum number of reconnect attempts
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnect attempt
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Default growth factor between reconnect attempts
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;

/// Default keepalive ping interval
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Errors that can occur during config operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Reconnection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Attempts allowed after consecutive failures before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt, in milliseconds
    pub base_delay_ms: u64,
    /// Growth factor applied per attempt
    pub multiplier: f64,
    /// Whether a close caused by `disconnect()` still schedules a reconnect.
    ///
    /// Defaults to `true`, which is the long-standing behaviour of the client
    /// even though it is probably not what callers want.
    pub reconnect_after_disconnect: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            reconnect_after_disconnect: true,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the first attempt
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay for the `attempt`-th reconnect (1-based): `base * multiplier^(attempt - 1)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay().as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the chat server
    pub url: String,
    /// Keepalive ping interval, in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Reconnection settings
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given endpoint with default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the heartbeat or the backoff schedule cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        let multiplier = self.reconnect.multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "reconnect.multiplier must be a positive number, got {multiplier}"
            )));
        }
        Ok(())
    }

    /// Override the endpoint
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Replace the reconnection settings
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Keepalive ping interval
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "ws://localhost:8765");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay(), Duration::from_secs(3));
        assert_eq!(config.reconnect.multiplier, 1.5);
        assert!(config.reconnect.reconnect_after_disconnect);
    }

    #[test]
    fn test_delay_for_attempt_default_schedule() {
        let reconnect = ReconnectConfig::default();
        let delays: Vec<Duration> = (1..=5).map(|k| reconnect.delay_for_attempt(k)).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(3000),
                Duration::from_millis(4500),
                Duration::from_millis(6750),
                Duration::from_millis(10125),
                Duration::from_micros(15_187_500),
            ]
        );
    }

    #[test]
    fn test_delay_has_no_cap() {
        let reconnect = ReconnectConfig {
            base_delay_ms: 1000,
            multiplier: 2.0,
            ..Default::default()
        };
        assert_eq!(reconnect.delay_for_attempt(11), Duration::from_secs(1024));
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let dir = tempdir().unwrap();
        let config = ClientConfig::load(&dir.path().join("client.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(
            &path,
            r#"
url = "ws://chat.example:9000"

[reconnect]
max_attempts = 2
reconnect_after_disconnect = false
"#,
        )
        .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.url, "ws://chat.example:9000");
        assert_eq!(config.heartbeat_interval_ms, DEFAULT_HEARTBEAT_INTERVAL_MS);
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.base_delay_ms, DEFAULT_RECONNECT_DELAY_MS);
        assert!(!config.reconnect.reconnect_after_disconnect);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "url = [[[").unwrap();

        let result = ClientConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_rejects_zero_heartbeat() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "heartbeat_interval_ms = 0\n").unwrap();

        let result = ClientConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_rejects_bad_multiplier() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");

        for multiplier in ["-1.5", "0.0", "nan", "inf"] {
            fs::write(&path, format!("[reconnect]\nmultiplier = {multiplier}\n")).unwrap();
            let result = ClientConfig::load(&path);
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "multiplier {multiplier} should be rejected"
            );
        }
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::new("ws://a")
            .with_url("ws://b")
            .with_heartbeat_interval(Duration::from_millis(250));
        assert_eq!(config.url, "ws://b");
        assert_eq!(config.heartbeat_interval_ms, 250);
    }
}
