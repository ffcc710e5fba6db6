//! Inbound message router.
//!
//! A single long-lived task reads raw frames from the inbound queue,
//! splits each frame into its messages and dispatches every message on
//! its `ev` tag: status messages go to [`handle_status`], data messages
//! are decoded (or passed through raw) and pushed to the output queue.

use std::ops::ControlFlow;

use bytes::Bytes;
use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{PolygonError, Result};
use crate::types::control::{EventTag, STATUS_EVENT, Status, StatusMessage};
use crate::types::events::{FeedEvent, decoder_for};

/// Act on a status message. Only `auth_failed` is an error; everything
/// else is logged.
pub(crate) fn handle_status(msg: &StatusMessage) -> Result<()> {
    match &msg.status {
        Status::Connected => tracing::debug!(message = %msg.message, "connection successful"),
        Status::AuthSuccess => tracing::debug!(message = %msg.message, "authentication successful"),
        Status::AuthFailed => return Err(PolygonError::AuthFailed(msg.message.clone())),
        Status::Success => tracing::debug!(message = %msg.message, "received a success status message"),
        Status::Error => tracing::error!(message = %msg.message, "received an error status message"),
        Status::Unknown(status) => {
            tracing::info!(%status, message = %msg.message, "unknown status message")
        }
    }
    Ok(())
}

/// Split one frame into its messages. Frames are normally JSON arrays;
/// a bare object is treated as a batch of one.
pub(crate) fn split_frame(payload: &[u8]) -> serde_json::Result<Vec<&RawValue>> {
    let first = payload.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'{') {
        Ok(vec![serde_json::from_slice(payload)?])
    } else {
        serde_json::from_slice(payload)
    }
}

/// Why the router stopped.
#[derive(Debug)]
pub(crate) enum RouterExit {
    Cancelled,
    InboundClosed,
    Fatal(PolygonError),
}

pub(crate) struct Router {
    inbound: mpsc::Receiver<Bytes>,
    output: mpsc::Sender<FeedEvent>,
    raw_data: bool,
    cancel: CancellationToken,
}

impl Router {
    pub fn new(
        inbound: mpsc::Receiver<Bytes>,
        output: mpsc::Sender<FeedEvent>,
        raw_data: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inbound,
            output,
            raw_data,
            cancel,
        }
    }

    /// Route frames until cancelled or a fatal status arrives. The output
    /// sender is dropped on return, which ends the consumer's stream.
    pub async fn run(mut self) -> RouterExit {
        loop {
            let frame = tokio::select! {
                () = self.cancel.cancelled() => return RouterExit::Cancelled,
                frame = self.inbound.recv() => match frame {
                    Some(frame) => frame,
                    None => return RouterExit::InboundClosed,
                },
            };
            if let ControlFlow::Break(exit) = self.route_frame(&frame).await {
                return exit;
            }
        }
    }

    async fn route_frame(&self, frame: &[u8]) -> ControlFlow<RouterExit> {
        let messages = match split_frame(frame) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                return ControlFlow::Continue(());
            }
        };

        for raw in messages {
            let tag = match serde_json::from_str::<EventTag<'_>>(raw.get()) {
                Ok(tag) => tag,
                Err(e) => {
                    tracing::warn!(error = %e, message = raw.get(), "message has no event type");
                    continue;
                }
            };

            if tag.ev == STATUS_EVENT {
                match serde_json::from_str::<StatusMessage>(raw.get()) {
                    Ok(status) => {
                        if let Err(e) = handle_status(&status) {
                            return ControlFlow::Break(RouterExit::Fatal(e));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to decode status message"),
                }
                continue;
            }

            let Some(event) = self.decode(&tag.ev, raw) else {
                continue;
            };
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return ControlFlow::Break(RouterExit::Cancelled),
                sent = self.output.send(event) => {
                    if sent.is_err() {
                        tracing::trace!("output stream dropped, discarding event");
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn decode(&self, tag: &str, raw: &RawValue) -> Option<FeedEvent> {
        if self.raw_data {
            return Some(FeedEvent::Raw(Bytes::copy_from_slice(raw.get().as_bytes())));
        }
        let Some(decode) = decoder_for(tag) else {
            tracing::warn!(event_type = tag, "unknown message type, dropping");
            return None;
        };
        match decode(raw.get()) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(event_type = tag, error = %e, "failed to decode message");
                None
            }
        }
    }
}
