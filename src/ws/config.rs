//! Client configuration and its builder.

use std::fmt;
use std::time::Duration;

use crate::constants::{
    DEFAULT_DIAL_TIMEOUT, DEFAULT_INBOUND_CAPACITY, DEFAULT_OUTBOUND_CAPACITY,
    DEFAULT_OUTPUT_CAPACITY, DEFAULT_PING_INTERVAL, DEFAULT_PONG_WAIT, DEFAULT_WRITE_TIMEOUT,
};
use crate::error::{PolygonError, Result};
use crate::types::enums::{Feed, Market};
use crate::ws::backoff::BackoffConfig;
use crate::ws::client::PolygonFeedClient;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the [`PolygonFeedClient`].
#[derive(Clone)]
pub struct PolygonFeedConfig {
    /// API key sent in the `auth` message.
    pub api_key: String,
    /// Cluster to dial.
    pub feed: Feed,
    /// Market path on the cluster.
    pub market: Market,
    /// Forward every data message undecoded as [`FeedEvent::Raw`](crate::types::FeedEvent::Raw).
    pub raw_data: bool,
    /// Heartbeat period.
    pub ping_interval: Duration,
    /// Read side gives up when no frame arrives for this long.
    pub pong_wait: Duration,
    /// Deadline for each transport write.
    pub write_timeout: Duration,
    /// Deadline for dialing plus the status/auth handshake.
    pub dial_timeout: Duration,
    /// Backoff between connection attempts.
    pub reconnect: BackoffConfig,
    /// Capacity of the raw inbound frame queue.
    pub inbound_capacity: usize,
    /// Capacity of the per-connection outbound queue.
    pub outbound_capacity: usize,
    /// Capacity of the consumer-facing output queue.
    pub output_capacity: usize,
}

impl Default for PolygonFeedConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            feed: Feed::default(),
            market: Market::default(),
            raw_data: false,
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_wait: DEFAULT_PONG_WAIT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            reconnect: BackoffConfig::default(),
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }
}

impl PolygonFeedConfig {
    /// Check the settings the client cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(PolygonError::MissingApiKey);
        }
        for (name, value) in [
            ("ping interval", self.ping_interval),
            ("write timeout", self.write_timeout),
            ("dial timeout", self.dial_timeout),
        ] {
            if value.is_zero() {
                return Err(PolygonError::InvalidArgument(format!(
                    "{name} must be non-zero"
                )));
            }
        }
        let backoff = &self.reconnect;
        if !backoff.multiplier.is_finite() {
            return Err(PolygonError::InvalidArgument(format!(
                "backoff multiplier must be finite, got {}",
                backoff.multiplier
            )));
        }
        if !backoff.jitter_factor.is_finite() || backoff.jitter_factor < 0.0 {
            return Err(PolygonError::InvalidArgument(format!(
                "backoff jitter factor must be finite and non-negative, got {}",
                backoff.jitter_factor
            )));
        }
        if self.ping_interval >= self.pong_wait {
            return Err(PolygonError::InvalidArgument(format!(
                "ping interval ({:?}) must be shorter than pong wait ({:?})",
                self.ping_interval, self.pong_wait
            )));
        }
        if self.inbound_capacity == 0 || self.outbound_capacity == 0 || self.output_capacity == 0 {
            return Err(PolygonError::InvalidArgument(
                "queue capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for PolygonFeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolygonFeedConfig")
            .field("api_key", &"[REDACTED]")
            .field("feed", &self.feed)
            .field("market", &self.market)
            .field("raw_data", &self.raw_data)
            .field("ping_interval", &self.ping_interval)
            .field("pong_wait", &self.pong_wait)
            .field("write_timeout", &self.write_timeout)
            .field("dial_timeout", &self.dial_timeout)
            .field("reconnect", &self.reconnect)
            .field("inbound_capacity", &self.inbound_capacity)
            .field("outbound_capacity", &self.outbound_capacity)
            .field("output_capacity", &self.output_capacity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`PolygonFeedClient`] with custom configuration.
///
/// # Example
///
/// ```no_run
/// use polygon_ws::ws::config::PolygonFeedClientBuilder;
/// use polygon_ws::types::{Feed, Market};
///
/// # fn main() -> polygon_ws::Result<()> {
/// let client = PolygonFeedClientBuilder::new("api-key")
///     .feed(Feed::Delayed)
///     .market(Market::Crypto)
///     .max_reconnect_attempts(Some(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct PolygonFeedClientBuilder {
    config: PolygonFeedConfig,
}

impl PolygonFeedClientBuilder {
    /// Create a new builder with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            config: PolygonFeedConfig {
                api_key: api_key.into(),
                ..PolygonFeedConfig::default()
            },
        }
    }

    /// Set the cluster. Default: [`Feed::RealTime`].
    pub fn feed(mut self, feed: Feed) -> Self {
        self.config.feed = feed;
        self
    }

    /// Set the market. Default: [`Market::Stocks`].
    pub fn market(mut self, market: Market) -> Self {
        self.config.market = market;
        self
    }

    /// Forward data messages undecoded. Default: false.
    pub fn raw_data(mut self, enable: bool) -> Self {
        self.config.raw_data = enable;
        self
    }

    /// Retries allowed per reconnect cycle; `None` retries forever. Default: 25.
    pub fn max_reconnect_attempts(mut self, n: Option<u32>) -> Self {
        self.config.reconnect.max_retries = n;
        self
    }

    /// Replace the whole backoff configuration.
    pub fn reconnect(mut self, backoff: BackoffConfig) -> Self {
        self.config.reconnect = backoff;
        self
    }

    /// Set the heartbeat period. Default: 9 s.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Set the read liveness window. Default: 10 s.
    pub fn pong_wait(mut self, wait: Duration) -> Self {
        self.config.pong_wait = wait;
        self
    }

    /// Set the per-write deadline. Default: 5 s.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the dial + handshake deadline. Default: 5 s.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    /// Set the inbound frame queue capacity. Default: 10,000.
    pub fn inbound_capacity(mut self, cap: usize) -> Self {
        self.config.inbound_capacity = cap;
        self
    }

    /// Set the outbound control queue capacity. Default: 1,000.
    pub fn outbound_capacity(mut self, cap: usize) -> Self {
        self.config.outbound_capacity = cap;
        self
    }

    /// Set the output event queue capacity. Default: 100,000.
    pub fn output_capacity(mut self, cap: usize) -> Self {
        self.config.output_capacity = cap;
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> Result<PolygonFeedClient> {
        PolygonFeedClient::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        let err = PolygonFeedClientBuilder::new("  ").build().unwrap_err();
        assert!(matches!(err, PolygonError::MissingApiKey));
    }

    #[test]
    fn ping_must_be_faster_than_pong_wait() {
        let config = PolygonFeedConfig {
            api_key: "key".into(),
            ping_interval: Duration::from_secs(10),
            pong_wait: Duration::from_secs(10),
            ..PolygonFeedConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PolygonError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let zero_ping = PolygonFeedClientBuilder::new("key")
            .ping_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(zero_ping, PolygonError::InvalidArgument(m) if m.contains("ping interval")));

        let zero_write = PolygonFeedClientBuilder::new("key")
            .write_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(zero_write, PolygonError::InvalidArgument(m) if m.contains("write timeout")));

        let zero_dial = PolygonFeedClientBuilder::new("key")
            .dial_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(zero_dial, PolygonError::InvalidArgument(m) if m.contains("dial timeout")));
    }

    #[test]
    fn unusable_backoff_factors_are_rejected() {
        let with_backoff = |multiplier: f64, jitter_factor: f64| PolygonFeedConfig {
            api_key: "key".into(),
            reconnect: BackoffConfig {
                multiplier,
                jitter_factor,
                ..BackoffConfig::default()
            },
            ..PolygonFeedConfig::default()
        };

        for (multiplier, jitter) in [
            (f64::NAN, 0.1),
            (f64::INFINITY, 0.1),
            (2.0, f64::NAN),
            (2.0, f64::INFINITY),
            (2.0, -0.1),
        ] {
            assert!(
                matches!(
                    with_backoff(multiplier, jitter).validate(),
                    Err(PolygonError::InvalidArgument(_))
                ),
                "multiplier {multiplier} / jitter {jitter} accepted"
            );
        }
        assert!(with_backoff(2.0, 0.0).validate().is_ok());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = PolygonFeedConfig {
            api_key: "super-secret".into(),
            ..PolygonFeedConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }
}
