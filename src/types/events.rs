//! Typed data events delivered on the output stream.
//!
//! Every inbound data message carries an `ev` tag. The tag selects one of
//! the decode targets below through [`decoder_for`]; the result is wrapped
//! in the closed [`FeedEvent`] enum. Field names follow the wire format
//! and are renamed to readable Rust names.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Second or minute aggregate bar for stocks, options and indices
/// (`A`, `AM`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EquityAgg {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Tick volume.
    #[serde(rename = "v", default)]
    pub volume: f64,
    /// Accumulated volume for the day.
    #[serde(rename = "av", default)]
    pub accumulated_volume: f64,
    /// Official opening price of the day.
    #[serde(rename = "op", default)]
    pub official_open_price: f64,
    /// Volume-weighted average price of this bar.
    #[serde(rename = "vw", default)]
    pub vwap: f64,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    /// Day VWAP.
    #[serde(rename = "a", default)]
    pub aggregate_vwap: f64,
    /// Average trade size of this bar.
    #[serde(rename = "z", default)]
    pub average_size: f64,
    /// Bar start (Unix ms).
    #[serde(rename = "s")]
    pub start_timestamp: i64,
    /// Bar end (Unix ms).
    #[serde(rename = "e")]
    pub end_timestamp: i64,
    #[serde(rename = "otc", default)]
    pub otc: bool,
}

/// Aggregate bar for forex and crypto pairs (`CAS`, `CA`, `XAS`, `XA`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrencyAgg {
    #[serde(rename = "ev")]
    pub event_type: String,
    pub pair: String,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "v", default)]
    pub volume: f64,
    #[serde(rename = "vw", default)]
    pub vwap: f64,
    #[serde(rename = "s")]
    pub start_timestamp: i64,
    #[serde(rename = "e")]
    pub end_timestamp: i64,
    #[serde(rename = "z", default)]
    pub average_size: f64,
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

/// Stock or option trade (`T`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EquityTrade {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "x", default)]
    pub exchange: i32,
    #[serde(rename = "i", default)]
    pub id: String,
    #[serde(rename = "z", default)]
    pub tape: i32,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "s", default)]
    pub size: f64,
    #[serde(rename = "c", default)]
    pub conditions: Vec<i32>,
    /// SIP timestamp (Unix ms).
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "q", default)]
    pub sequence_number: i64,
    #[serde(rename = "trfi", default)]
    pub trade_reporting_facility_id: Option<i64>,
    #[serde(rename = "trft", default)]
    pub trade_reporting_facility_timestamp: Option<i64>,
}

/// Crypto trade (`XT`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CryptoTrade {
    #[serde(rename = "ev")]
    pub event_type: String,
    pub pair: String,
    #[serde(rename = "x", default)]
    pub exchange: i32,
    #[serde(rename = "i", default)]
    pub id: String,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "s", default)]
    pub size: f64,
    #[serde(rename = "c", default)]
    pub conditions: Vec<i32>,
    #[serde(rename = "t")]
    pub timestamp: i64,
    /// When the feed received the trade (Unix ms).
    #[serde(rename = "r", default)]
    pub received_timestamp: i64,
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// Stock or option NBBO quote (`Q`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EquityQuote {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "bx", default)]
    pub bid_exchange_id: i32,
    #[serde(rename = "bp", default)]
    pub bid_price: f64,
    #[serde(rename = "bs", default)]
    pub bid_size: f64,
    #[serde(rename = "ax", default)]
    pub ask_exchange_id: i32,
    #[serde(rename = "ap", default)]
    pub ask_price: f64,
    #[serde(rename = "as", default)]
    pub ask_size: f64,
    #[serde(rename = "c", default)]
    pub condition: i32,
    #[serde(rename = "i", default)]
    pub indicators: Vec<i32>,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "q", default)]
    pub sequence_number: i64,
    #[serde(rename = "z", default)]
    pub tape: i32,
}

/// Forex quote (`C`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForexQuote {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "p")]
    pub pair: String,
    #[serde(rename = "x", default)]
    pub exchange_id: i32,
    #[serde(rename = "a")]
    pub ask_price: f64,
    #[serde(rename = "b")]
    pub bid_price: f64,
    #[serde(rename = "t")]
    pub timestamp: i64,
}

/// Crypto quote (`XQ`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CryptoQuote {
    #[serde(rename = "ev")]
    pub event_type: String,
    pub pair: String,
    #[serde(rename = "bp")]
    pub bid_price: f64,
    #[serde(rename = "bs", default)]
    pub bid_size: f64,
    #[serde(rename = "ap")]
    pub ask_price: f64,
    #[serde(rename = "as", default)]
    pub ask_size: f64,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "x", default)]
    pub exchange_id: i32,
    #[serde(rename = "r", default)]
    pub received_timestamp: i64,
}

// ---------------------------------------------------------------------------
// Other stock events
// ---------------------------------------------------------------------------

/// Net order imbalance during an auction (`NOI`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Imbalance {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "T")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "at", default)]
    pub auction_time: i64,
    #[serde(rename = "a", default)]
    pub auction_type: String,
    #[serde(rename = "i", default)]
    pub symbol_sequence: i64,
    #[serde(rename = "x", default)]
    pub exchange_id: i32,
    #[serde(rename = "o", default)]
    pub imbalance_quantity: i64,
    #[serde(rename = "p", default)]
    pub paired_quantity: i64,
    #[serde(rename = "b", default)]
    pub book_clearing_price: f64,
}

/// Limit-up / limit-down price band (`LULD`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LimitUpLimitDown {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "T")]
    pub symbol: String,
    #[serde(rename = "h")]
    pub high_price: f64,
    #[serde(rename = "l")]
    pub low_price: f64,
    #[serde(rename = "i", default)]
    pub indicators: Vec<i32>,
    #[serde(rename = "z", default)]
    pub tape: i32,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "q", default)]
    pub sequence_number: i64,
}

// ---------------------------------------------------------------------------
// Order book, fair market value, index value
// ---------------------------------------------------------------------------

/// Crypto level-2 book snapshot (`XL2`). Each level is `[price, size]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Level2Book {
    #[serde(rename = "ev")]
    pub event_type: String,
    pub pair: String,
    #[serde(rename = "b", default)]
    pub bid_prices: Vec<[f64; 2]>,
    #[serde(rename = "a", default)]
    pub ask_prices: Vec<[f64; 2]>,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "x", default)]
    pub exchange_id: i32,
    #[serde(rename = "r", default)]
    pub received_timestamp: i64,
}

/// Fair market value estimate (`FMV`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FairMarketValue {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "fmv")]
    pub value: f64,
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub timestamp: i64,
}

/// Index value tick (`V`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexValue {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "val")]
    pub value: f64,
    #[serde(rename = "T")]
    pub ticker: String,
    #[serde(rename = "t")]
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// FeedEvent
// ---------------------------------------------------------------------------

/// One event delivered to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    EquityAgg(EquityAgg),
    CurrencyAgg(CurrencyAgg),
    EquityTrade(EquityTrade),
    CryptoTrade(CryptoTrade),
    EquityQuote(EquityQuote),
    ForexQuote(ForexQuote),
    CryptoQuote(CryptoQuote),
    Imbalance(Imbalance),
    LimitUpLimitDown(LimitUpLimitDown),
    Level2Book(Level2Book),
    FairMarketValue(FairMarketValue),
    IndexValue(IndexValue),
    /// Undecoded JSON of a single message (raw-passthrough mode).
    Raw(Bytes),
}

macro_rules! impl_from_event {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for FeedEvent {
                fn from(ev: $variant) -> Self {
                    Self::$variant(ev)
                }
            }
        )*
    };
}

impl_from_event!(
    EquityAgg,
    CurrencyAgg,
    EquityTrade,
    CryptoTrade,
    EquityQuote,
    ForexQuote,
    CryptoQuote,
    Imbalance,
    LimitUpLimitDown,
    Level2Book,
    FairMarketValue,
    IndexValue,
);

impl FeedEvent {
    /// The `ev` tag of a decoded event; `None` for raw payloads.
    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::EquityAgg(e) => Some(&e.event_type),
            Self::CurrencyAgg(e) => Some(&e.event_type),
            Self::EquityTrade(e) => Some(&e.event_type),
            Self::CryptoTrade(e) => Some(&e.event_type),
            Self::EquityQuote(e) => Some(&e.event_type),
            Self::ForexQuote(e) => Some(&e.event_type),
            Self::CryptoQuote(e) => Some(&e.event_type),
            Self::Imbalance(e) => Some(&e.event_type),
            Self::LimitUpLimitDown(e) => Some(&e.event_type),
            Self::Level2Book(e) => Some(&e.event_type),
            Self::FairMarketValue(e) => Some(&e.event_type),
            Self::IndexValue(e) => Some(&e.event_type),
            Self::Raw(_) => None,
        }
    }

    /// Ticker or currency pair the event refers to.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::EquityAgg(e) => Some(&e.symbol),
            Self::CurrencyAgg(e) => Some(&e.pair),
            Self::EquityTrade(e) => Some(&e.symbol),
            Self::CryptoTrade(e) => Some(&e.pair),
            Self::EquityQuote(e) => Some(&e.symbol),
            Self::ForexQuote(e) => Some(&e.pair),
            Self::CryptoQuote(e) => Some(&e.pair),
            Self::Imbalance(e) => Some(&e.symbol),
            Self::LimitUpLimitDown(e) => Some(&e.symbol),
            Self::Level2Book(e) => Some(&e.pair),
            Self::FairMarketValue(e) => Some(&e.symbol),
            Self::IndexValue(e) => Some(&e.ticker),
            Self::Raw(_) => None,
        }
    }

    /// Event time as a UTC datetime. Aggregates report their bar start.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let millis = match self {
            Self::EquityAgg(e) => e.start_timestamp,
            Self::CurrencyAgg(e) => e.start_timestamp,
            Self::EquityTrade(e) => e.timestamp,
            Self::CryptoTrade(e) => e.timestamp,
            Self::EquityQuote(e) => e.timestamp,
            Self::ForexQuote(e) => e.timestamp,
            Self::CryptoQuote(e) => e.timestamp,
            Self::Imbalance(e) => e.timestamp,
            Self::LimitUpLimitDown(e) => e.timestamp,
            Self::Level2Book(e) => e.timestamp,
            Self::FairMarketValue(e) => e.timestamp,
            Self::IndexValue(e) => e.timestamp,
            Self::Raw(_) => return None,
        };
        DateTime::from_timestamp_millis(millis)
    }
}

// ---------------------------------------------------------------------------
// Tag → decoder table
// ---------------------------------------------------------------------------

/// Decodes one JSON message into a [`FeedEvent`].
pub type Decoder = fn(&str) -> serde_json::Result<FeedEvent>;

fn decode_as<T>(raw: &str) -> serde_json::Result<FeedEvent>
where
    T: DeserializeOwned + Into<FeedEvent>,
{
    serde_json::from_str::<T>(raw).map(Into::into)
}

static DECODERS: &[(&str, Decoder)] = &[
    ("A", decode_as::<EquityAgg>),
    ("AM", decode_as::<EquityAgg>),
    ("CAS", decode_as::<CurrencyAgg>),
    ("CA", decode_as::<CurrencyAgg>),
    ("XAS", decode_as::<CurrencyAgg>),
    ("XA", decode_as::<CurrencyAgg>),
    ("T", decode_as::<EquityTrade>),
    ("XT", decode_as::<CryptoTrade>),
    ("Q", decode_as::<EquityQuote>),
    ("C", decode_as::<ForexQuote>),
    ("XQ", decode_as::<CryptoQuote>),
    ("NOI", decode_as::<Imbalance>),
    ("LULD", decode_as::<LimitUpLimitDown>),
    ("XL2", decode_as::<Level2Book>),
    ("FMV", decode_as::<FairMarketValue>),
    ("V", decode_as::<IndexValue>),
];

/// Look up the decoder for an `ev` tag.
pub fn decoder_for(tag: &str) -> Option<Decoder> {
    DECODERS
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, decode)| *decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::enums::Topic;

    #[test]
    fn every_topic_prefix_has_a_decoder() {
        for topic in Topic::ALL {
            assert!(
                decoder_for(topic.prefix()).is_some(),
                "no decoder for {:?} ({})",
                topic,
                topic.prefix()
            );
        }
        assert!(decoder_for("status").is_none());
        assert!(decoder_for("ZZZ").is_none());
    }

    #[test]
    fn decodes_equity_trade() {
        let raw = r#"{"ev":"T","sym":"AAPL","x":4,"i":"52983525029461","z":3,"p":172.35,"s":100,"c":[12,37],"t":1700000000123,"q":1063}"#;
        let event = decoder_for("T").unwrap()(raw).unwrap();
        let FeedEvent::EquityTrade(trade) = &event else {
            panic!("expected trade, got {event:?}");
        };
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.price, 172.35);
        assert_eq!(trade.conditions, vec![12, 37]);
        assert_eq!(event.symbol(), Some("AAPL"));
        assert_eq!(
            event.timestamp().unwrap().timestamp_millis(),
            1_700_000_000_123
        );
    }

    #[test]
    fn decodes_level2_book() {
        let raw = r#"{"ev":"XL2","pair":"BTC-USD","t":1700000000000,"x":1,"r":1700000000005,"b":[[36000.5,0.2],[35999.0,1.5]],"a":[[36001.0,0.3]]}"#;
        let FeedEvent::Level2Book(book) = decoder_for("XL2").unwrap()(raw).unwrap() else {
            panic!("expected level 2 book");
        };
        assert_eq!(book.bid_prices.len(), 2);
        assert_eq!(book.ask_prices[0], [36001.0, 0.3]);
    }

    #[test]
    fn wrong_field_type_is_a_decode_error() {
        let raw = r#"{"ev":"Q","sym":"AAPL","bp":"cheap","t":1}"#;
        assert!(decoder_for("Q").unwrap()(raw).is_err());
    }

    #[test]
    fn raw_event_has_no_metadata() {
        let event = FeedEvent::Raw(Bytes::from_static(br#"{"ev":"T"}"#));
        assert!(event.event_type().is_none());
        assert!(event.symbol().is_none());
        assert!(event.timestamp().is_none());
    }
}
