//! Consumer side of the output queue.
//!
//! The queue is a bounded `mpsc` channel. The router is its only producer
//! and waits for free capacity rather than dropping events, so a slow
//! consumer slows the router down, then the inbound queue fills, then the
//! read pump stops pulling from the socket. `close()` on the client never
//! waits on a full queue.
//!
//! The stream ends (`None`) exactly once, when the client shuts down.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::types::events::FeedEvent;

/// Stream of events produced by a [`PolygonFeedClient`](crate::ws::client::PolygonFeedClient).
///
/// Implements [`Stream<Item = FeedEvent>`] so you can use it with
/// `StreamExt::next()` and other stream combinators.
#[derive(Debug)]
pub struct FeedStream {
    rx: mpsc::Receiver<FeedEvent>,
}

impl FeedStream {
    pub(crate) fn new(rx: mpsc::Receiver<FeedEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event. `None` means the session is over.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is ready.
    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        self.rx.try_recv().ok()
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no events are waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Stream for FeedStream {
    type Item = FeedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
