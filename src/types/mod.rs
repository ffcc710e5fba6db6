//! Wire and domain types for the streaming API.
//!
//! ## Organization
//!
//! - [`enums`] — Feeds, markets and subscribable topics
//! - [`control`] — Auth / subscribe / status envelopes
//! - [`events`] — Typed data events and the tag → decoder table
//!
//! All enums are re-exported at the module root via `pub use enums::*`.

pub mod control;
pub mod enums;
pub mod events;

pub use enums::*;
pub use events::FeedEvent;
