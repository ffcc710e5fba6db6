//! Streaming client for the Polygon WebSocket feed.
//!
//! One [`PolygonFeedClient`] owns one logical session: a single physical
//! connection at a time, replaced transparently when it fails, plus the
//! subscription registry that is replayed onto every new connection.
//!
//! # Architecture
//!
//! ```text
//!   subscribe / unsubscribe ──► registry ──(replay)──┐
//!                │                                   ▼
//!                └──► outbound queue ──► write pump ──► socket
//!                                        (pings)       │
//!   FeedStream ◄── output queue ◄── router ◄── inbound queue ◄── read pump
//! ```
//!
//! The read and write pumps belong to one connection ("epoch") and are
//! replaced on every reconnect. The router and the output queue live for
//! the whole session, so the consumer's [`FeedStream`] survives
//! reconnects and ends exactly once, on close.
//!
//! # Quick Start
//!
//! ```no_run
//! use polygon_ws::ws::client::PolygonFeedClient;
//! use polygon_ws::types::{Market, Topic};
//!
//! # #[tokio::main]
//! # async fn main() -> polygon_ws::Result<()> {
//! let client = PolygonFeedClient::builder("api-key")
//!     .market(Market::Stocks)
//!     .build()?;
//!
//! client.connect().await?;
//! client.subscribe(Topic::StocksTrades, &["AAPL", "MSFT"]).await?;
//!
//! let mut events = client.output().expect("output taken once");
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{PolygonError, Result};
use crate::types::control::{Action, ControlMessage, Status, StatusMessage};
use crate::types::enums::{Feed, Market, Topic};
use crate::types::events::FeedEvent;
use crate::ws::backoff::ReconnectPolicy;
use crate::ws::config::{PolygonFeedClientBuilder, PolygonFeedConfig};
use crate::ws::output::FeedStream;
use crate::ws::pumps::{WritePump, WsStream, read_pump};
use crate::ws::router::{Router, RouterExit, handle_status, split_frame};
use crate::ws::subscriptions::{SubscriptionRegistry, control_message, normalize_symbols};

/// Lifecycle state of a [`PolygonFeedClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built but never successfully connected.
    Unconnected,
    /// Streaming over a live connection.
    Connected,
    /// The connection dropped and a new one is being established.
    Reconnecting,
    /// Closed by the caller or by a fatal error. Terminal.
    Closed,
}

/// Fatal error slot shared with every [`PolygonFeedClient::error`] receiver.
pub type ErrorSignal = watch::Receiver<Option<Arc<PolygonError>>>;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// One physical connection and the tasks serving it.
struct Epoch {
    id: u64,
    cancel: CancellationToken,
    outbound: mpsc::Sender<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl Epoch {
    async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Router inputs held until the first successful connect.
struct PendingRouter {
    inbound: mpsc::Receiver<Bytes>,
    output: mpsc::Sender<FeedEvent>,
}

struct SessionState {
    phase: ConnectionState,
    registry: SubscriptionRegistry,
    epoch: Option<Epoch>,
    next_epoch: u64,
    pending_router: Option<PendingRouter>,
    router: Option<JoinHandle<()>>,
    output: Option<mpsc::Receiver<FeedEvent>>,
}

struct Inner {
    config: PolygonFeedConfig,
    url: Url,
    /// Serializes connect, reconnect and shutdown. Never held by
    /// subscribe/unsubscribe.
    lifecycle: tokio::sync::Mutex<()>,
    /// Held across a registry change and its enqueue, so the wire sees
    /// changes in registry order.
    subscription_gate: tokio::sync::Mutex<()>,
    /// Never held across an await.
    state: Mutex<SessionState>,
    /// Session-wide token: stops the router and interrupts backoff waits.
    session: CancellationToken,
    inbound: mpsc::Sender<Bytes>,
    fatal: watch::Sender<Option<Arc<PolygonError>>>,
}

// ---------------------------------------------------------------------------
// PolygonFeedClient
// ---------------------------------------------------------------------------

/// Persistent streaming client for one feed cluster and market.
pub struct PolygonFeedClient {
    inner: Arc<Inner>,
}

impl PolygonFeedClient {
    /// Start building a client with the given API key.
    pub fn builder(api_key: impl Into<String>) -> PolygonFeedClientBuilder {
        PolygonFeedClientBuilder::new(api_key)
    }

    /// Validate `config` and create an unconnected client. Does not touch
    /// the network.
    pub fn new(config: PolygonFeedConfig) -> Result<Self> {
        config.validate()?;
        let url = config.feed.url(&config.market)?;

        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (output_tx, output_rx) = mpsc::channel(config.output_capacity);
        let (fatal, _) = watch::channel(None);

        tracing::debug!(%url, market = %config.market, "feed client created");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                url,
                lifecycle: tokio::sync::Mutex::new(()),
                subscription_gate: tokio::sync::Mutex::new(()),
                state: Mutex::new(SessionState {
                    phase: ConnectionState::Unconnected,
                    registry: SubscriptionRegistry::new(),
                    epoch: None,
                    next_epoch: 0,
                    pending_router: Some(PendingRouter {
                        inbound: inbound_rx,
                        output: output_tx,
                    }),
                    router: None,
                    output: Some(output_rx),
                }),
                session: CancellationToken::new(),
                inbound: inbound_tx,
                fatal,
            }),
        })
    }

    /// Dial, authenticate and start streaming.
    ///
    /// Retries with backoff until the attempt budget is spent, in which
    /// case the last failure is returned and the client stays unconnected.
    /// An `auth_failed` reply is never retried: the client is closed and
    /// [`PolygonError::AuthFailed`] returned. Calling this on a connected
    /// client is a no-op.
    pub async fn connect(&self) -> Result<()> {
        let _gate = self.inner.lifecycle.lock().await;
        let phase = self.inner.state.lock().phase;
        match phase {
            ConnectionState::Closed => return Err(PolygonError::Closed),
            ConnectionState::Connected | ConnectionState::Reconnecting => return Ok(()),
            ConnectionState::Unconnected => {}
        }

        tracing::info!(url = %self.inner.url, "connecting to feed");
        match self.inner.establish().await {
            Ok(()) => Ok(()),
            Err(PolygonError::AuthFailed(message)) => {
                self.inner
                    .shutdown_locked(Some(PolygonError::AuthFailed(message.clone())))
                    .await;
                Err(PolygonError::AuthFailed(message))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to connect");
                Err(e)
            }
        }
    }

    /// Subscribe to `topic` for `symbols`. An empty list or one containing
    /// `"*"` subscribes to every symbol.
    ///
    /// Before [`connect`](Self::connect) only the registry is updated; the
    /// subscription is sent once the connection is up.
    pub async fn subscribe(&self, topic: Topic, symbols: &[&str]) -> Result<()> {
        self.update_subscription(Action::Subscribe, topic, symbols)
            .await
    }

    /// Unsubscribe from `topic` for `symbols`. An empty list or one
    /// containing `"*"` drops the whole topic.
    pub async fn unsubscribe(&self, topic: Topic, symbols: &[&str]) -> Result<()> {
        self.update_subscription(Action::Unsubscribe, topic, symbols)
            .await
    }

    async fn update_subscription(
        &self,
        action: Action,
        topic: Topic,
        symbols: &[&str],
    ) -> Result<()> {
        let market = &self.inner.config.market;
        if !market.supports(topic) {
            return Err(PolygonError::TopicNotSupported {
                market: market.clone(),
                topic,
            });
        }

        let symbols = normalize_symbols(symbols);
        let msg = control_message(action, topic, &symbols).to_json()?;

        let _order = self.inner.subscription_gate.lock().await;
        let outbound = {
            let mut state = self.inner.state.lock();
            if state.phase == ConnectionState::Closed {
                return Err(PolygonError::Closed);
            }
            match action {
                Action::Subscribe => state.registry.add(topic, &symbols),
                _ => state.registry.remove(topic, &symbols),
            }
            state.epoch.as_ref().map(|epoch| epoch.outbound.clone())
        };

        match outbound {
            Some(outbound) => {
                if outbound.send(msg).await.is_err() {
                    tracing::debug!(?topic, "connection is going away, change will be replayed");
                }
            }
            None => tracing::debug!(?topic, "not connected, change recorded for replay"),
        }
        Ok(())
    }

    /// Take the event stream. Returns `None` after the first call.
    pub fn output(&self) -> Option<FeedStream> {
        self.inner.state.lock().output.take().map(FeedStream::new)
    }

    /// Watch for the fatal error that closed the client, if any.
    pub fn error(&self) -> ErrorSignal {
        self.inner.fatal.subscribe()
    }

    /// Stop streaming and release every task. The event stream ends after
    /// already-queued events. Idempotent.
    pub async fn close(&self) {
        self.inner.shutdown(None).await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().phase
    }

    /// Whether a live connection is streaming.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current desired subscriptions, ordered by topic then symbol.
    pub fn subscriptions(&self) -> Vec<(Topic, Vec<String>)> {
        self.inner.state.lock().registry.snapshot()
    }

    pub fn config(&self) -> &PolygonFeedConfig {
        &self.inner.config
    }

    pub fn feed(&self) -> &Feed {
        &self.inner.config.feed
    }

    pub fn market(&self) -> &Market {
        &self.inner.config.market
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }
}

impl fmt::Debug for PolygonFeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolygonFeedClient")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for PolygonFeedClient {
    fn drop(&mut self) {
        self.inner.session.cancel();
        let mut state = self.inner.state.lock();
        state.phase = ConnectionState::Closed;
        state.pending_router = None;
        if let Some(epoch) = state.epoch.take() {
            epoch.cancel.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

impl Inner {
    /// Dial until a connection is authenticated, then start its pumps.
    /// Caller holds the lifecycle lock.
    async fn establish(self: &Arc<Self>) -> Result<()> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let mut attempt: u32 = 0;

        let ws = loop {
            attempt += 1;
            let dialed = tokio::select! {
                () = self.session.cancelled() => return Err(PolygonError::Closed),
                dialed = dial(&self.config, &self.url) => dialed,
            };
            let err = match dialed {
                Ok(ws) => break ws,
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            let Some(delay) = policy.next_delay() else {
                return Err(PolygonError::ReconnectExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            };
            tracing::warn!(attempt, error = %err, ?delay, "connection attempt failed, retrying");
            tokio::select! {
                () = self.session.cancelled() => return Err(PolygonError::Closed),
                () = tokio::time::sleep(delay) => {}
            }
        };

        self.start_epoch(ws);
        Ok(())
    }

    /// Install a fresh connection: replay the registry, spawn both pumps
    /// and, on the first connect, the router.
    fn start_epoch(self: &Arc<Self>, ws: WsStream) {
        let (writer, reader) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);
        let cancel = CancellationToken::new();
        let read_closed = CancellationToken::new();

        let mut state = self.state.lock();
        let id = state.next_epoch;
        state.next_epoch += 1;

        let replay: Vec<String> = state
            .registry
            .subscribe_messages()
            .iter()
            .filter_map(|msg| match msg.to_json() {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode replay message");
                    None
                }
            })
            .collect();

        let read_task = tokio::spawn(read_pump(
            id,
            reader,
            self.inbound.clone(),
            self.config.pong_wait,
            cancel.clone(),
            read_closed.clone(),
        ));

        let pump = WritePump {
            epoch: id,
            writer,
            replay,
            outbound: outbound_rx,
            ping_interval: self.config.ping_interval,
            write_timeout: self.config.write_timeout,
            cancel: cancel.clone(),
            read_closed,
        };
        let guard = ReconnectGuard::new(Arc::downgrade(self), id);
        let write_task = tokio::spawn(async move {
            match pump.run().await {
                Ok(()) => guard.disarm(),
                Err(e) => {
                    tracing::warn!(epoch = id, error = %e, "connection lost");
                    drop(guard);
                }
            }
        });

        state.epoch = Some(Epoch {
            id,
            cancel,
            outbound: outbound_tx,
            tasks: vec![read_task, write_task],
        });
        state.phase = ConnectionState::Connected;

        if let Some(pending) = state.pending_router.take() {
            state.router = Some(self.spawn_router(pending));
        }
        tracing::info!(epoch = id, topics = state.registry.len(), "connected to feed");
    }

    fn spawn_router(self: &Arc<Self>, pending: PendingRouter) -> JoinHandle<()> {
        let router = Router::new(
            pending.inbound,
            pending.output,
            self.config.raw_data,
            self.session.clone(),
        );
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            match router.run().await {
                RouterExit::Fatal(err) => {
                    tracing::error!(error = %err, "fatal status from server, closing client");
                    if let Some(inner) = weak.upgrade() {
                        inner.raise(err);
                        // Shutdown joins this task, so it cannot run inline.
                        tokio::spawn(async move { inner.shutdown(None).await });
                    }
                }
                RouterExit::Cancelled => tracing::debug!("router stopped"),
                RouterExit::InboundClosed => tracing::debug!("inbound queue closed, router stopped"),
            }
        })
    }

    /// Replace a failed connection. Runs detached, spawned by the write
    /// pump's guard.
    async fn reconnect(self: Arc<Self>, failed_epoch: u64) {
        let _gate = self.lifecycle.lock().await;
        let stale = {
            let mut state = self.state.lock();
            let current = state.epoch.as_ref().map(|epoch| epoch.id);
            if current != Some(failed_epoch) || state.phase != ConnectionState::Connected {
                None
            } else {
                state.phase = ConnectionState::Reconnecting;
                state.epoch.take()
            }
        };
        let Some(stale) = stale else {
            return;
        };

        tracing::warn!(epoch = failed_epoch, "reconnecting to feed");
        stale.stop().await;

        match self.establish().await {
            Ok(()) => {}
            Err(PolygonError::Closed) => self.shutdown_locked(None).await,
            Err(e) => {
                tracing::error!(error = %e, "could not reconnect, closing client");
                self.shutdown_locked(Some(e)).await;
            }
        }
    }

    async fn shutdown(&self, cause: Option<PolygonError>) {
        self.session.cancel();
        let _gate = self.lifecycle.lock().await;
        self.shutdown_locked(cause).await;
    }

    /// Caller holds the lifecycle lock.
    async fn shutdown_locked(&self, cause: Option<PolygonError>) {
        let (epoch, router, pending) = {
            let mut state = self.state.lock();
            if state.phase == ConnectionState::Closed {
                return;
            }
            state.phase = ConnectionState::Closed;
            (
                state.epoch.take(),
                state.router.take(),
                state.pending_router.take(),
            )
        };
        if let Some(err) = cause {
            self.raise(err);
        }
        self.session.cancel();

        if let Some(epoch) = epoch {
            epoch.stop().await;
        }
        drop(pending);
        if let Some(router) = router {
            let _ = router.await;
        }
        tracing::info!("feed client closed");
    }

    /// Publish the first fatal error; later ones are ignored.
    fn raise(&self, err: PolygonError) {
        let err = Arc::new(err);
        self.fatal.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(err);
            true
        });
    }
}

// ---------------------------------------------------------------------------
// Reconnect trigger
// ---------------------------------------------------------------------------

/// Owned by a write pump. Dropping it armed (pump failed, panicked or was
/// aborted) schedules exactly one reconnect for that pump's connection.
struct ReconnectGuard {
    inner: Weak<Inner>,
    epoch: u64,
    armed: bool,
}

impl ReconnectGuard {
    fn new(inner: Weak<Inner>, epoch: u64) -> Self {
        Self {
            inner,
            epoch,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ReconnectGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.session.is_cancelled() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(inner.reconnect(self.epoch));
            }
            Err(_) => tracing::warn!(epoch = self.epoch, "no runtime, cannot reconnect"),
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Open a socket and complete the `connected` → `auth` → `auth_success`
/// exchange within the dial timeout.
async fn dial(config: &PolygonFeedConfig, url: &Url) -> Result<WsStream> {
    let handshake = async {
        let (mut ws, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::debug!(status = %response.status(), "websocket upgraded");

        expect_status(&mut ws, Status::Connected).await?;
        let auth = ControlMessage::auth(config.api_key.as_str()).to_json()?;
        ws.send(Message::Text(auth.into())).await?;
        expect_status(&mut ws, Status::AuthSuccess).await?;
        Ok::<_, PolygonError>(ws)
    };
    timeout(config.dial_timeout, handshake)
        .await
        .map_err(|_| PolygonError::Timeout("connecting"))?
}

/// Read the next data frame and require its first message to be a status
/// message with `expected`.
async fn expect_status(ws: &mut WsStream, expected: Status) -> Result<()> {
    let payload = loop {
        let msg = ws.next().await.ok_or_else(|| {
            PolygonError::Handshake("connection closed during handshake".into())
        })??;
        match msg {
            Message::Text(text) => break Bytes::from(text),
            Message::Binary(data) => break data,
            Message::Close(_) => {
                return Err(PolygonError::Handshake(
                    "server closed the connection during handshake".into(),
                ));
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        }
    };

    let messages = split_frame(&payload)
        .map_err(|e| PolygonError::Handshake(format!("malformed status frame: {e}")))?;
    let first = messages
        .first()
        .ok_or_else(|| PolygonError::Handshake("empty status frame".into()))?;
    let status: StatusMessage = serde_json::from_str(first.get())
        .map_err(|e| PolygonError::Handshake(format!("expected a status message: {e}")))?;

    handle_status(&status)?;
    if status.status != expected {
        return Err(PolygonError::Handshake(format!(
            "expected status {expected:?}, got {:?} ({})",
            status.status, status.message
        )));
    }
    Ok(())
}
