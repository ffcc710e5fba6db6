//! Per-connection tasks moving frames across the transport boundary.
//!
//! Both pumps live exactly as long as one physical connection and share
//! that connection's cancellation token. The read pump never triggers a
//! reconnect itself: when it stops for any reason other than cancellation
//! it trips `read_closed`, and the write pump turns that into an abnormal
//! exit, which is what the supervisor reacts to.

use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::error::{PolygonError, Result};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsWriter = SplitSink<WsStream, Message>;
pub(crate) type WsReader = SplitStream<WsStream>;

// ---------------------------------------------------------------------------
// Read pump
// ---------------------------------------------------------------------------

enum ReadExit {
    Cancelled,
    Closed,
    Failed(PolygonError),
}

/// Forward every data frame from `reader` into `inbound` until the
/// connection ends or `cancel` fires.
pub(crate) async fn read_pump(
    epoch: u64,
    mut reader: WsReader,
    inbound: mpsc::Sender<Bytes>,
    pong_wait: Duration,
    cancel: CancellationToken,
    read_closed: CancellationToken,
) {
    let exit = loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break ReadExit::Cancelled,
            next = timeout(pong_wait, reader.next()) => next,
        };

        let msg = match next {
            Err(_) => break ReadExit::Failed(PolygonError::Timeout("waiting for server frames")),
            Ok(None) => break ReadExit::Closed,
            Ok(Some(Err(
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
            ))) => break ReadExit::Closed,
            Ok(Some(Err(e))) => break ReadExit::Failed(e.into()),
            Ok(Some(Ok(msg))) => msg,
        };

        let payload = match msg {
            Message::Text(text) => Bytes::from(text),
            Message::Binary(data) => data,
            // Any frame, pongs included, already refreshed the read window.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            Message::Close(frame) => {
                tracing::debug!(epoch, ?frame, "server sent close frame");
                break ReadExit::Closed;
            }
        };

        tokio::select! {
            () = cancel.cancelled() => break ReadExit::Cancelled,
            sent = inbound.send(payload) => {
                if sent.is_err() {
                    break ReadExit::Cancelled;
                }
            }
        }
    };

    match exit {
        ReadExit::Cancelled => {
            tracing::debug!(epoch, "read pump stopped");
            return;
        }
        ReadExit::Closed => tracing::debug!(epoch, "connection closed by peer"),
        ReadExit::Failed(e) => tracing::error!(epoch, error = %e, "read pump failed"),
    }
    read_closed.cancel();
}

// ---------------------------------------------------------------------------
// Write pump
// ---------------------------------------------------------------------------

/// Drains the outbound queue onto the socket and keeps the connection
/// alive with pings.
pub(crate) struct WritePump {
    pub epoch: u64,
    pub writer: WsWriter,
    /// Subscribe messages restoring the registry, sent before anything else.
    pub replay: Vec<String>,
    pub outbound: mpsc::Receiver<String>,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
    pub cancel: CancellationToken,
    pub read_closed: CancellationToken,
}

impl WritePump {
    /// Run until cancelled (`Ok`) or until the connection fails (`Err`).
    pub async fn run(mut self) -> Result<()> {
        for msg in std::mem::take(&mut self.replay) {
            self.write(Message::Text(msg.into()), "replaying subscriptions")
                .await?;
        }

        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.close_gracefully().await;
                    return Ok(());
                }
                () = self.read_closed.cancelled() => {
                    return Err(PolygonError::WebSocket(tungstenite::Error::ConnectionClosed));
                }
                _ = heartbeat.tick() => {
                    self.write(Message::Ping(Bytes::new()), "sending ping").await?;
                }
                msg = self.outbound.recv() => match msg {
                    Some(text) => {
                        tracing::debug!(epoch = self.epoch, %text, "sending control message");
                        self.write(Message::Text(text.into()), "writing control message")
                            .await?;
                    }
                    None => {
                        self.close_gracefully().await;
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn write(&mut self, msg: Message, what: &'static str) -> Result<()> {
        match timeout(self.write_timeout, self.writer.send(msg)).await {
            Ok(sent) => sent.map_err(PolygonError::from),
            Err(_) => Err(PolygonError::Timeout(what)),
        }
    }

    async fn close_gracefully(&mut self) {
        if let Err(e) = self.write(Message::Close(None), "closing connection").await {
            tracing::debug!(epoch = self.epoch, error = %e, "failed to close gracefully");
        }
    }
}
