//! # polygon-ws
//!
//! A Rust client for the [Polygon.io WebSocket API](https://polygon.io/docs/stocks/ws_getting-started).
//!
//! ## Quick Start
//!
//! ```no_run
//! use polygon_ws::PolygonFeedClient;
//! use polygon_ws::types::{Market, Topic};
//!
//! #[tokio::main]
//! async fn main() -> polygon_ws::Result<()> {
//!     let client = PolygonFeedClient::builder("your-api-key")
//!         .market(Market::Stocks)
//!         .build()?;
//!     client.connect().await?;
//!     client.subscribe(Topic::StocksTrades, &["AAPL"]).await?;
//!
//!     if let Some(mut events) = client.output() {
//!         while let Some(event) = events.recv().await {
//!             println!("{event:?}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod constants;
pub mod error;
pub mod types;
pub mod ws;

/// Re-export the main client types at crate root for convenience.
pub use ws::client::{ConnectionState, PolygonFeedClient};
pub use ws::config::{PolygonFeedClientBuilder, PolygonFeedConfig};
pub use ws::output::FeedStream;
/// Re-export the error type and Result alias.
pub use error::{PolygonError, Result};
