//! Provider and cache configuration.
//!
//! Configuration is read once at assembly time and is immutable for the
//! lifetime of a cache instance. Loading and merging config files is the
//! embedding application's job; this crate only defines the shapes and
//! validates them.

use std::time::Duration;

use crate::domain::{LineId, StopId};

/// Default freshness window for the realtime feed.
const DEFAULT_FEED_TTL: Duration = Duration::from_secs(30);

/// Default caller-facing wait bound. Intentionally shorter than the socket
/// timeout so the cache, not the transport, governs caller latency.
const DEFAULT_CALLER_TIMEOUT: Duration = Duration::from_secs(29);

/// Default socket-level timeout for one network call.
const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TTL for the slow-changing stop metadata cache.
const DEFAULT_STOP_INFO_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default capacity for the stop metadata cache.
const DEFAULT_STOP_INFO_CAPACITY: u64 = 10_000;

/// Default rate-limit reserve margin.
const DEFAULT_RESERVE: u64 = 100;

/// Errors detected while assembling a provider from its configuration.
///
/// These are fatal at startup; nothing at runtime produces them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("missing API key for provider feed {endpoint}")]
    MissingApiKey { endpoint: String },

    #[error("missing feed endpoint")]
    MissingFeedEndpoint,

    #[error("no monitored stops configured")]
    NoMonitoredStops,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Payload format a provider feed uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// Binary GTFS-realtime feed message.
    GtfsRealtime,
    /// Proprietary JSON dataset API.
    Json,
}

/// Configuration for one upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Realtime feed endpoint.
    pub feed_url: String,

    /// Stop metadata dataset endpoint.
    pub stops_url: String,

    /// API key sent as a query parameter.
    pub api_key: String,

    /// Payload format of the realtime feed.
    pub format: FeedFormat,

    /// Stops to monitor; every one of these appears in every response.
    pub monitored_stops: Vec<StopId>,

    /// Lines to keep when a stop has no association entry of its own.
    /// Empty means every line is kept.
    pub monitored_lines: Vec<LineId>,

    /// Socket-level timeout for one network call.
    pub socket_timeout: Duration,

    /// Quota to keep in reserve rather than racing the limit to zero.
    pub rate_limit_reserve: u64,

    /// TTL for cached stop metadata.
    pub stop_info_ttl: Duration,

    /// Maximum number of cached stop metadata entries.
    pub stop_info_capacity: u64,
}

impl ProviderConfig {
    /// Create a config with the given endpoints and credential.
    pub fn new(
        feed_url: impl Into<String>,
        stops_url: impl Into<String>,
        api_key: impl Into<String>,
        format: FeedFormat,
    ) -> Self {
        Self {
            feed_url: feed_url.into(),
            stops_url: stops_url.into(),
            api_key: api_key.into(),
            format,
            monitored_stops: Vec::new(),
            monitored_lines: Vec::new(),
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            rate_limit_reserve: DEFAULT_RESERVE,
            stop_info_ttl: DEFAULT_STOP_INFO_TTL,
            stop_info_capacity: DEFAULT_STOP_INFO_CAPACITY,
        }
    }

    /// Set the monitored stops.
    pub fn with_monitored_stops(mut self, stops: Vec<StopId>) -> Self {
        self.monitored_stops = stops;
        self
    }

    /// Set the monitored lines.
    pub fn with_monitored_lines(mut self, lines: Vec<LineId>) -> Self {
        self.monitored_lines = lines;
        self
    }

    /// Set the socket-level timeout.
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Set the rate-limit reserve margin.
    pub fn with_rate_limit_reserve(mut self, reserve: u64) -> Self {
        self.rate_limit_reserve = reserve;
        self
    }

    /// Set the stop metadata TTL.
    pub fn with_stop_info_ttl(mut self, ttl: Duration) -> Self {
        self.stop_info_ttl = ttl;
        self
    }

    /// Check the config is complete enough to build a provider from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_url.is_empty() {
            return Err(ConfigError::MissingFeedEndpoint);
        }
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey {
                endpoint: self.feed_url.clone(),
            });
        }
        if self.monitored_stops.is_empty() {
            return Err(ConfigError::NoMonitoredStops);
        }
        Ok(())
    }
}

/// Configuration for the coalescing cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Freshness window for published feed results.
    pub ttl: Duration,

    /// Per-caller wait bound on a pending fetch.
    pub caller_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_FEED_TTL,
            caller_timeout: DEFAULT_CALLER_TIMEOUT,
        }
    }
}

impl CacheConfig {
    /// Set the feed TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the caller timeout.
    pub fn with_caller_timeout(mut self, timeout: Duration) -> Self {
        self.caller_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ProviderConfig {
        ProviderConfig::new(
            "https://provider.example/waiting-times",
            "https://provider.example/stops",
            "secret",
            FeedFormat::Json,
        )
        .with_monitored_stops(vec![StopId::parse("8122").unwrap()])
    }

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(30));
        assert_eq!(config.caller_timeout, Duration::from_secs(29));

        let provider = valid_config();
        assert_eq!(provider.socket_timeout, Duration::from_secs(30));
        assert_eq!(provider.rate_limit_reserve, 100);

        // The socket timeout must exceed the caller timeout so the cache
        // governs caller-visible latency.
        assert!(provider.socket_timeout > config.caller_timeout);
    }

    #[test]
    fn validation_catches_missing_pieces() {
        assert!(valid_config().validate().is_ok());

        let mut config = valid_config();
        config.api_key = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingApiKey { .. })
        ));

        let mut config = valid_config();
        config.monitored_stops.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoMonitoredStops)
        ));
    }
}
