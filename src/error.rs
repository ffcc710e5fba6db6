//! Error types for the `polygon-ws` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, PolygonError>`.
//!
//! [`PolygonError`] covers:
//! - **Configuration errors** — Missing API key, topic/market mismatch
//! - **Handshake errors** — Unexpected status during connect, failed auth
//! - **WebSocket errors** — Connection and protocol errors
//! - **JSON errors** — Serialization / deserialization failures
//! - **URL errors** — Malformed feed URL construction
//! - **Lifecycle errors** — Exhausted reconnect budget, closed client

use crate::types::enums::{Market, Topic};

/// All possible errors produced by the `polygon-ws` client.
#[derive(Debug, thiserror::Error)]
pub enum PolygonError {
    /// The client was built without an API key.
    #[error("API key is required")]
    MissingApiKey,

    /// The configured market does not carry the requested topic.
    #[error("topic {topic:?} is not supported by market '{market}'")]
    TopicNotSupported {
        /// The market the client was built for.
        market: Market,
        /// The rejected topic.
        topic: Topic,
    },

    /// The caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The server answered the connect handshake with something unexpected.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server rejected the API key.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize or deserialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A transport operation did not finish in time.
    #[error("timed out while {0}")]
    Timeout(&'static str),

    /// The reconnection policy gave up.
    #[error("gave up after {attempts} connection attempts: {last}")]
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        last: String,
    },

    /// The client has been closed and cannot be reused.
    #[error("client is closed")]
    Closed,
}

impl PolygonError {
    /// Whether a connection attempt that failed with this error may be
    /// retried by the reconnection policy.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::MissingApiKey
                | Self::TopicNotSupported { .. }
                | Self::InvalidArgument(_)
                | Self::AuthFailed(_)
                | Self::Url(_)
                | Self::Closed
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PolygonError>;
