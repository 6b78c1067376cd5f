//! Explicit configuration for the real-time channel.
//!
//! Everything that used to be an ambient environment gate (feature flags disabling sockets in
//! development, placeholder hosts) is a field here and is handed to the manager when it is
//! constructed.

use std::time::Duration;

use http::Uri;
use serde::Deserialize;

use super::types::{DeclineReason, RealtimeError, RealtimeResult, WebSocketBufferConfig};

/// Channel-wide configuration.
///
/// Deserializes from any serde format; durations are expressed in milliseconds and missing
/// fields take their defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Master switch; when false every `connect` declines.
    pub enabled: bool,
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Ceiling for a single backoff delay. `None` keeps the doubling uncapped.
    #[serde(rename = "max_delay_ms", with = "opt_duration_ms")]
    pub max_delay: Option<Duration>,
    pub max_retries: u32,
    /// Scale each backoff delay into `[0.5, 1.0] x delay`.
    pub jitter: bool,
    #[serde(rename = "heartbeat_interval_ms", with = "duration_ms")]
    pub heartbeat_interval: Duration,
    pub heartbeat_mode: HeartbeatMode,
    /// Treat a connection with no inbound activity for this long as dead. Checked on every
    /// heartbeat tick, or once per threshold for connections without a heartbeat.
    #[serde(rename = "stale_threshold_ms", with = "opt_duration_ms")]
    pub stale_threshold: Option<Duration>,
    /// Hard cap on frames queued while a connection is not open.
    pub max_queued: usize,
    /// Hosts `connect` refuses. A leading `.` matches any host with that suffix.
    pub blocked_hosts: Vec<String>,
    /// Capacity of the broadcast channel carrying [`super::ConnectionEvent`]s.
    pub event_capacity: usize,
    #[serde(skip)]
    pub buffers: WebSocketBufferConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: Duration::from_millis(1_000),
            max_delay: None,
            max_retries: 5,
            jitter: false,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_mode: HeartbeatMode::Application,
            stale_threshold: None,
            max_queued: 1_024,
            blocked_hosts: vec![".invalid".to_string()],
            event_capacity: 256,
            buffers: WebSocketBufferConfig::default(),
        }
    }
}

impl RealtimeConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_heartbeat_mode(mut self, mode: HeartbeatMode) -> Self {
        self.heartbeat_mode = mode;
        self
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = Some(threshold);
        self
    }

    pub fn with_max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = max_queued;
        self
    }

    pub fn with_blocked_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> RealtimeResult<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(RealtimeError::InvalidConfig(
                "heartbeat_interval must be non-zero".to_string(),
            ));
        }
        if self.stale_threshold.is_some_and(|t| t.is_zero()) {
            return Err(RealtimeError::InvalidConfig(
                "stale_threshold must be non-zero".to_string(),
            ));
        }
        if self.max_queued == 0 {
            return Err(RealtimeError::InvalidConfig(
                "max_queued must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(RealtimeError::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(max) = self.max_delay
            && max < self.base_delay
        {
            return Err(RealtimeError::InvalidConfig(format!(
                "max_delay {max:?} is below base_delay {:?}",
                self.base_delay
            )));
        }
        Ok(())
    }

    /// Decide whether `address` may be dialled at all.
    pub fn check_address(&self, address: &str) -> Result<(), DeclineReason> {
        let address = address.trim();
        if address.is_empty() {
            return Err(DeclineReason::EmptyAddress);
        }
        if !self.enabled {
            return Err(DeclineReason::Disabled);
        }

        let uri: Uri = address
            .parse()
            .map_err(|err: http::uri::InvalidUri| DeclineReason::InvalidAddress(err.to_string()))?;
        match uri.scheme_str() {
            Some("ws") | Some("wss") => {}
            Some(other) => {
                return Err(DeclineReason::InvalidAddress(format!(
                    "unsupported scheme {other}"
                )));
            }
            None => return Err(DeclineReason::InvalidAddress("missing scheme".to_string())),
        }
        let Some(host) = uri.host().filter(|h| !h.is_empty()) else {
            return Err(DeclineReason::InvalidAddress("missing host".to_string()));
        };

        let host = host.to_ascii_lowercase();
        let blocked = self.blocked_hosts.iter().any(|entry| {
            let entry = entry.to_ascii_lowercase();
            match entry.strip_prefix('.') {
                Some(suffix) => host == suffix || host.ends_with(&entry),
                None => host == entry,
            }
        });
        if blocked {
            return Err(DeclineReason::BlockedHost(host));
        }
        Ok(())
    }
}

/// How keepalives are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatMode {
    /// `{"type":"ping","data":{}}` text frames.
    #[default]
    Application,
    /// Websocket ping control frames.
    Protocol,
}

/// Per-connection overrides passed to `connect`.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// Name used in logs instead of the address.
    pub label: Option<String>,
    pub heartbeat: bool,
    pub auto_reconnect: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            label: None,
            heartbeat: true,
            auto_reconnect: true,
        }
    }
}

impl ConnectOptions {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat = false;
        self
    }

    pub fn without_reconnect(mut self) -> Self {
        self.auto_reconnect = false;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declines_empty_disabled_and_placeholder_addresses() {
        let config = RealtimeConfig::default();
        assert_eq!(config.check_address("  "), Err(DeclineReason::EmptyAddress));
        assert!(matches!(
            config.check_address("https://feed.example.com"),
            Err(DeclineReason::InvalidAddress(_))
        ));
        assert_eq!(
            config.check_address("wss://feed.example.invalid/ws"),
            Err(DeclineReason::BlockedHost("feed.example.invalid".to_string()))
        );
        assert!(config.check_address("wss://feed.example.com/ws").is_ok());

        let disabled = RealtimeConfig::disabled();
        assert_eq!(
            disabled.check_address("wss://feed.example.com/ws"),
            Err(DeclineReason::Disabled)
        );
    }

    #[test]
    fn blocked_hosts_match_exact_and_suffix_entries() {
        let config = RealtimeConfig::default().with_blocked_hosts(["localhost", ".staging.local"]);
        assert!(matches!(
            config.check_address("ws://LOCALHOST:8080"),
            Err(DeclineReason::BlockedHost(_))
        ));
        assert!(matches!(
            config.check_address("ws://odds.staging.local/ws"),
            Err(DeclineReason::BlockedHost(_))
        ));
        assert!(config.check_address("ws://localhost.example.com").is_ok());
        // The default `.invalid` entry was replaced.
        assert!(config.check_address("ws://feed.invalid").is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: RealtimeConfig = sonic_rs::from_str(
            r#"{"enabled":false,"base_delay_ms":250,"max_retries":3,"heartbeat_mode":"protocol","stale_threshold_ms":9000}"#,
        )
        .expect("config parses");
        assert!(!config.enabled);
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.heartbeat_mode, HeartbeatMode::Protocol);
        assert_eq!(config.stale_threshold, Some(Duration::from_secs(9)));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_delay, None);
        assert_eq!(config.blocked_hosts, vec![".invalid".to_string()]);
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        assert!(RealtimeConfig::default().validate().is_ok());
        assert!(
            RealtimeConfig::default()
                .with_heartbeat_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(RealtimeConfig::default().with_max_queued(0).validate().is_err());
        assert!(
            RealtimeConfig::default()
                .with_stale_threshold(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            RealtimeConfig::default()
                .with_base_delay(Duration::from_secs(10))
                .with_max_delay(Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }
}
