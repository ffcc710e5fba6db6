//! Constants for Polygon-style WebSocket feeds.
//!
//! Contains cluster base URLs plus the timing and queue-capacity defaults
//! used by [`PolygonFeedConfig`](crate::ws::config::PolygonFeedConfig).
//! Every timing value here is only a default; the builder overrides them.

use std::time::Duration;

// ---------------------------------------------------------------------------
// WebSocket URLs
// ---------------------------------------------------------------------------

/// 15-minute delayed data cluster.
pub const WS_DELAYED_URL: &str = "wss://delayed.polygon.io";

/// Real-time data cluster.
pub const WS_REALTIME_URL: &str = "wss://socket.polygon.io";

/// Nasdaq Basic real-time feed.
pub const WS_NASDAQ_URL: &str = "wss://nasdaqfeed.polygon.io";

/// PolyFeed cluster.
pub const WS_POLYFEED_URL: &str = "wss://polyfeed.polygon.io";

/// PolyFeed+ cluster.
pub const WS_POLYFEED_PLUS_URL: &str = "wss://polyfeedplus.polygon.io";

/// Starter plan feed.
pub const WS_STARTER_URL: &str = "wss://starterfeed.polygon.io";

/// Launchpad feed.
pub const WS_LAUNCHPAD_URL: &str = "wss://launchpad.polygon.io";

// ---------------------------------------------------------------------------
// Timing defaults
// ---------------------------------------------------------------------------

/// Deadline for every transport write, heartbeats included.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the read side waits for any frame (a pong at minimum) before
/// declaring the peer gone.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(10);

/// Heartbeat period. Must stay below [`DEFAULT_PONG_WAIT`].
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(9);

/// Bound on dialing plus the status/auth handshake.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum number of consecutive connection attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 25;

// ---------------------------------------------------------------------------
// Queue capacities
// ---------------------------------------------------------------------------

/// Raw frames buffered between the read pump and the router.
pub const DEFAULT_INBOUND_CAPACITY: usize = 10_000;

/// Control messages buffered for the write pump.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1_000;

/// Decoded events buffered for the consumer.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 100_000;

/// Sentinel symbol meaning "every symbol of the topic".
pub const ALL_SYMBOLS: &str = "*";
