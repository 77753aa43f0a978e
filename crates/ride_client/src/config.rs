//! Client configuration: defaults, optional JSON file overlay, then environment overrides.
//!
//! Durations are written as integer milliseconds so config files stay readable:
//!
//! ```json
//! { "backend_base_url": "http://dispatch.local/api", "polling": { "interval": 500 } }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ride_core::tier::TierTable;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_BACKEND_URL: &str = "RIDE_BACKEND_URL";
pub const ENV_SOCKET_ADDR: &str = "RIDE_SOCKET_ADDR";
pub const ENV_WEBSOCKET_URL: &str = "RIDE_WEBSOCKET_URL";
pub const ENV_LOCATION_STORE: &str = "RIDE_LOCATION_STORE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub backend_base_url: String,
    /// Address for the TCP line transport.
    pub socket_addr: String,
    /// Driver socket endpoint; the driver id is appended as the last path segment.
    pub websocket_url: String,
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// JSON file for the last-known-location cache; in-memory when unset.
    pub location_store: Option<PathBuf>,
    pub location: LocationPolicy,
    pub reconnect: ReconnectPolicy,
    pub polling: PollingPolicy,
    /// Replaces the standard vehicle tier table when present.
    pub tiers: Option<TierTable>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:8080/api".to_string(),
            socket_addr: "127.0.0.1:8080".to_string(),
            websocket_url: "ws://localhost:8080/ws/driver".to_string(),
            request_timeout: Duration::from_secs(10),
            location_store: None,
            location: LocationPolicy::default(),
            reconnect: ReconnectPolicy::default(),
            polling: PollingPolicy::default(),
            tiers: None,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with the JSON file at `path`. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ClientConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RIDE_*` environment overrides from the process environment.
    pub fn apply_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = non_blank(ENV_BACKEND_URL) {
            self.backend_base_url = url;
        }
        if let Some(addr) = non_blank(ENV_SOCKET_ADDR) {
            self.socket_addr = addr;
        }
        if let Some(url) = non_blank(ENV_WEBSOCKET_URL) {
            self.websocket_url = url;
        }
        if let Some(path) = non_blank(ENV_LOCATION_STORE) {
            self.location_store = Some(PathBuf::from(path));
        }
        self
    }

    pub fn tier_table(&self) -> TierTable {
        self.tiers.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend_base_url must not be empty".into()));
        }
        if !(self.websocket_url.starts_with("ws://") || self.websocket_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "websocket_url must be a ws:// or wss:// URL, got '{}'",
                self.websocket_url
            )));
        }
        if self.location.max_attempts == 0 {
            return Err(ConfigError::Invalid("location.max_attempts must be at least 1".into()));
        }
        if !(self.location.accuracy_threshold_m.is_finite()
            && self.location.accuracy_threshold_m > 0.0)
        {
            return Err(ConfigError::Invalid(
                "location.accuracy_threshold_m must be positive".into(),
            ));
        }
        if self.polling.interval.is_zero() {
            return Err(ConfigError::Invalid("polling.interval must be non-zero".into()));
        }
        if self.polling.max_attempts == 0 {
            return Err(ConfigError::Invalid("polling.max_attempts must be at least 1".into()));
        }
        if let Some(tiers) = &self.tiers {
            if tiers.is_empty() {
                return Err(ConfigError::Invalid("tiers must not be empty when set".into()));
            }
            for tier in tiers.iter() {
                for (field, value) in [
                    ("rate_per_km", tier.rate_per_km),
                    ("eta_min_per_km", tier.eta_min_per_km),
                ] {
                    if !(value.is_finite() && value >= 0.0) {
                        return Err(ConfigError::Invalid(format!(
                            "tier '{}': {field} must be a non-negative number, got {value}",
                            tier.key
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Accuracy-aware retry policy for position acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationPolicy {
    pub max_attempts: u32,
    pub accuracy_threshold_m: f64,
    #[serde(with = "duration_ms")]
    pub attempt_timeout: Duration,
    /// Oldest device-cached fix the source may return; zero forces a fresh fix.
    #[serde(with = "duration_ms")]
    pub max_sample_age: Duration,
    #[serde(with = "duration_ms")]
    pub inter_attempt_delay: Duration,
    #[serde(with = "duration_ms")]
    pub cache_freshness: Duration,
}

impl Default for LocationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            accuracy_threshold_m: 50.0,
            attempt_timeout: Duration::from_secs(60),
            max_sample_age: Duration::ZERO,
            inter_attempt_delay: Duration::from_secs(8),
            cache_freshness: Duration::from_secs(30 * 60),
        }
    }
}

/// Linear backoff: attempt `n` waits `n * base_delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingPolicy {
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    pub max_attempts: u32,
    /// Declines allowed on one booking before it is given up as DECLINED.
    pub max_reassignments: u32,
}

impl PollingPolicy {
    /// Wall-clock budget of one assignment poll cycle.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }

    /// Poll attempts that fit into `timeout`, at least one.
    pub fn attempts_within(&self, timeout: Duration) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let attempts = timeout.as_millis().div_ceil(interval);
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
            max_reassignments: 5,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        u64::deserialize(de).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_policy() {
        let config = ClientConfig::default();
        assert_eq!(config.location.max_attempts, 5);
        assert_eq!(config.location.inter_attempt_delay, Duration::from_secs(8));
        assert_eq!(config.reconnect.delay_for(3), Duration::from_secs(3));
        assert_eq!(config.polling.budget(), Duration::from_secs(30));
        assert_eq!(config.polling.max_reassignments, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn attempts_within_rounds_up() {
        let polling = PollingPolicy::default();
        assert_eq!(polling.attempts_within(Duration::from_secs(30)), 30);
        assert_eq!(polling.attempts_within(Duration::from_millis(2_500)), 3);
        assert_eq!(polling.attempts_within(Duration::ZERO), 1);
    }

    #[test]
    fn file_overlay_keeps_unlisted_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"backend_base_url":"http://example.test/api","polling":{{"interval":250}}}}"#
        )
        .expect("write");

        let config = ClientConfig::load(file.path()).expect("load");
        assert_eq!(config.backend_base_url, "http://example.test/api");
        assert_eq!(config.polling.interval, Duration::from_millis(250));
        assert_eq!(config.polling.max_attempts, 30);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn invalid_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"polling":{{"interval":0}}}}"#).expect("write");
        assert!(matches!(
            ClientConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write");
        assert!(matches!(
            ClientConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn tier_overrides_with_negative_or_non_finite_rates_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"tiers":[{{"key":"bike","rate_per_km":-6,"eta_min_per_km":2.5,"capacity":1}}]}}"#
        )
        .expect("write");
        let error = ClientConfig::load(file.path()).expect_err("negative rate");
        assert!(error.to_string().contains("rate_per_km"), "{error}");

        let mut config = ClientConfig::default();
        let mut tiers: Vec<_> = TierTable::standard().iter().cloned().collect();
        tiers[1].eta_min_per_km = f64::NAN;
        config.tiers = Some(TierTable::new(tiers));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.tiers = Some(TierTable::standard());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn websocket_url_needs_a_ws_scheme() {
        let config = ClientConfig {
            websocket_url: "http://localhost:8080/ws/driver".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn env_overrides_replace_addresses() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BACKEND_URL, "http://override/api"),
            (ENV_SOCKET_ADDR, "  "),
            (ENV_WEBSOCKET_URL, "wss://dispatch.example/ws/driver"),
            (ENV_LOCATION_STORE, "/tmp/locations.json"),
        ]);
        let config = ClientConfig::default()
            .with_overrides(|key| env.get(key).map(|value| value.to_string()));
        assert_eq!(config.backend_base_url, "http://override/api");
        assert_eq!(config.socket_addr, "127.0.0.1:8080");
        assert_eq!(config.websocket_url, "wss://dispatch.example/ws/driver");
        assert_eq!(
            config.location_store,
            Some(PathBuf::from("/tmp/locations.json"))
        );
    }
}
