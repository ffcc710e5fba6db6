//! Control-plane messages: the outbound `auth` / `subscribe` /
//! `unsubscribe` envelope and the inbound `status` envelope.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Event tag carried by status messages.
pub const STATUS_EVENT: &str = "status";

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Action of an outbound control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Auth,
    Subscribe,
    Unsubscribe,
}

/// Outbound control message, e.g.
/// `{"action":"subscribe","params":"T.AAPL,T.MSFT"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage {
    /// What the server should do.
    pub action: Action,
    /// API key for `auth`, comma-separated `<prefix>.<symbol>` list otherwise.
    pub params: String,
}

impl ControlMessage {
    /// Authentication request carrying the API key.
    pub fn auth(api_key: impl Into<String>) -> Self {
        Self {
            action: Action::Auth,
            params: api_key.into(),
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Status value of an inbound status message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Status {
    Connected,
    AuthSuccess,
    AuthFailed,
    Success,
    Error,
    /// Any status this client does not know about.
    Unknown(String),
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        match s.as_str() {
            "connected" => Self::Connected,
            "auth_success" => Self::AuthSuccess,
            "auth_failed" => Self::AuthFailed,
            "success" => Self::Success,
            "error" => Self::Error,
            _ => Self::Unknown(s),
        }
    }
}

/// Inbound status message, e.g.
/// `{"ev":"status","status":"auth_success","message":"authenticated"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusMessage {
    /// Always `"status"`.
    pub ev: String,
    /// The status value.
    pub status: Status,
    /// Free-form server text.
    #[serde(default)]
    pub message: String,
}

/// Just enough of any inbound message to route it.
#[derive(Debug, Deserialize)]
pub(crate) struct EventTag<'a> {
    #[serde(borrow)]
    pub ev: Cow<'a, str>,
}
