//! WebSocket streaming client.
//!
//! Polygon serves every market over a single WebSocket endpoint per
//! cluster (`wss://<cluster>.polygon.io/<market>`). Messages are JSON
//! arrays; every element carries an `ev` tag naming its type.
//!
//! ## [`client`] — Session supervisor
//!
//! [`PolygonFeedClient`](client::PolygonFeedClient) dials, authenticates,
//! replays subscriptions and reconnects with backoff when the connection
//! drops. Events arrive on a [`FeedStream`](output::FeedStream).
//!
//! ## Internals
//!
//! - [`subscriptions`] — Desired topic → symbol state, replayed on reconnect
//! - [`backoff`] — Jittered exponential backoff between dial attempts
//! - [`config`] — Timeouts, capacities and the client builder
//! - `pumps` — Per-connection read and write tasks, heartbeat
//! - `router` — Status handling and `ev` tag dispatch
//!
//! ## Usage
//!
//! [`FeedStream`](output::FeedStream) implements [`futures_util::Stream`]
//! so you can use it with `StreamExt::next()` and other async combinators.

pub mod backoff;
pub mod client;
pub mod config;
pub mod output;
pub(crate) mod pumps;
pub(crate) mod router;
pub mod subscriptions;
