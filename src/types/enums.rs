//! Feed, market and topic enumerations.
//!
//! A [`Topic`] is one streamed event kind. Topic codes are grouped in
//! numeric bands, one band per [`Market`]; a market accepts exactly the
//! topics whose code falls strictly inside its band. Unrecognized markets
//! ([`Market::Other`]) accept every topic.

use std::fmt;

use url::Url;

use crate::constants::{
    WS_DELAYED_URL, WS_LAUNCHPAD_URL, WS_NASDAQ_URL, WS_POLYFEED_PLUS_URL, WS_POLYFEED_URL,
    WS_REALTIME_URL, WS_STARTER_URL,
};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Endpoint family the client connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Feed {
    /// 15-minute delayed cluster.
    Delayed,
    /// Real-time cluster.
    #[default]
    RealTime,
    /// Nasdaq Basic feed.
    Nasdaq,
    /// PolyFeed cluster.
    PolyFeed,
    /// PolyFeed+ cluster.
    PolyFeedPlus,
    /// Starter plan feed.
    Starter,
    /// Launchpad feed.
    Launchpad,
    /// Any other base URL, e.g. a proxy or a local test server
    /// (`ws://127.0.0.1:9000`).
    Custom(String),
}

impl Feed {
    /// Base URL of the cluster, without the market path.
    pub fn base_url(&self) -> &str {
        match self {
            Self::Delayed => WS_DELAYED_URL,
            Self::RealTime => WS_REALTIME_URL,
            Self::Nasdaq => WS_NASDAQ_URL,
            Self::PolyFeed => WS_POLYFEED_URL,
            Self::PolyFeedPlus => WS_POLYFEED_PLUS_URL,
            Self::Starter => WS_STARTER_URL,
            Self::Launchpad => WS_LAUNCHPAD_URL,
            Self::Custom(url) => url,
        }
    }

    /// Full dial URL for `market` on this feed: `<base>/<market path>`.
    pub fn url(&self, market: &Market) -> Result<Url> {
        let base = self.base_url().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{}", market.path()))?)
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_url())
    }
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Asset-class namespace selected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Market {
    #[default]
    Stocks,
    Options,
    Forex,
    Crypto,
    Indices,
    /// Unrecognized market path. All topics are allowed.
    Other(String),
}

impl Market {
    /// URL path segment of the market.
    pub fn path(&self) -> &str {
        match self {
            Self::Stocks => "stocks",
            Self::Options => "options",
            Self::Forex => "forex",
            Self::Crypto => "crypto",
            Self::Indices => "indices",
            Self::Other(path) => path,
        }
    }

    /// Exclusive bounds of the topic band this market supports, or `None`
    /// when the market is unrecognized.
    fn topic_band(&self) -> Option<(u8, u8)> {
        match self {
            Self::Stocks => Some((topic_band::STOCKS_MIN, topic_band::STOCKS_MAX)),
            Self::Options => Some((topic_band::OPTIONS_MIN, topic_band::OPTIONS_MAX)),
            Self::Forex => Some((topic_band::FOREX_MIN, topic_band::FOREX_MAX)),
            Self::Crypto => Some((topic_band::CRYPTO_MIN, topic_band::CRYPTO_MAX)),
            Self::Indices => Some((topic_band::INDICES_MIN, topic_band::INDICES_MAX)),
            Self::Other(_) => None,
        }
    }

    /// Whether this market carries `topic`.
    pub fn supports(&self, topic: Topic) -> bool {
        match self.topic_band() {
            Some((min, max)) => {
                let code = topic.code();
                code > min && code < max
            }
            None => true,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl From<&str> for Market {
    fn from(path: &str) -> Self {
        match path {
            "stocks" => Self::Stocks,
            "options" => Self::Options,
            "forex" => Self::Forex,
            "crypto" => Self::Crypto,
            "indices" => Self::Indices,
            other => Self::Other(other.to_owned()),
        }
    }
}

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

mod topic_band {
    pub const STOCKS_MIN: u8 = 0;
    pub const STOCKS_MAX: u8 = 10;
    pub const OPTIONS_MIN: u8 = 20;
    pub const OPTIONS_MAX: u8 = 30;
    pub const FOREX_MIN: u8 = 40;
    pub const FOREX_MAX: u8 = 50;
    pub const CRYPTO_MIN: u8 = 60;
    pub const CRYPTO_MAX: u8 = 70;
    pub const INDICES_MIN: u8 = 80;
    pub const INDICES_MAX: u8 = 90;
}

/// A subscribable channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Topic {
    StocksSecAggs = 1,
    StocksMinAggs = 2,
    StocksTrades = 3,
    StocksQuotes = 4,
    StocksImbalances = 5,
    StocksLULD = 6,
    StocksFairMarketValue = 7,

    OptionsSecAggs = 21,
    OptionsMinAggs = 22,
    OptionsTrades = 23,
    OptionsQuotes = 24,
    OptionsFairMarketValue = 25,

    ForexSecAggs = 41,
    ForexMinAggs = 42,
    ForexQuotes = 43,
    ForexFairMarketValue = 44,

    CryptoSecAggs = 61,
    CryptoMinAggs = 62,
    CryptoTrades = 63,
    CryptoQuotes = 64,
    CryptoL2Book = 65,
    CryptoFairMarketValue = 66,

    IndexSecAggs = 81,
    IndexMinAggs = 82,
    IndexValue = 83,
}

impl Topic {
    /// Every topic, in code order.
    pub const ALL: [Topic; 25] = [
        Self::StocksSecAggs,
        Self::StocksMinAggs,
        Self::StocksTrades,
        Self::StocksQuotes,
        Self::StocksImbalances,
        Self::StocksLULD,
        Self::StocksFairMarketValue,
        Self::OptionsSecAggs,
        Self::OptionsMinAggs,
        Self::OptionsTrades,
        Self::OptionsQuotes,
        Self::OptionsFairMarketValue,
        Self::ForexSecAggs,
        Self::ForexMinAggs,
        Self::ForexQuotes,
        Self::ForexFairMarketValue,
        Self::CryptoSecAggs,
        Self::CryptoMinAggs,
        Self::CryptoTrades,
        Self::CryptoQuotes,
        Self::CryptoL2Book,
        Self::CryptoFairMarketValue,
        Self::IndexSecAggs,
        Self::IndexMinAggs,
        Self::IndexValue,
    ];

    /// Numeric code of the topic.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Wire prefix used in subscribe params and in the `ev` tag of
    /// inbound events.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::StocksSecAggs | Self::OptionsSecAggs | Self::IndexSecAggs => "A",
            Self::StocksMinAggs | Self::OptionsMinAggs | Self::IndexMinAggs => "AM",
            Self::StocksTrades | Self::OptionsTrades => "T",
            Self::StocksQuotes | Self::OptionsQuotes => "Q",
            Self::StocksImbalances => "NOI",
            Self::StocksLULD => "LULD",
            Self::StocksFairMarketValue
            | Self::OptionsFairMarketValue
            | Self::ForexFairMarketValue
            | Self::CryptoFairMarketValue => "FMV",
            Self::ForexSecAggs => "CAS",
            Self::ForexMinAggs => "CA",
            Self::ForexQuotes => "C",
            Self::CryptoSecAggs => "XAS",
            Self::CryptoMinAggs => "XA",
            Self::CryptoTrades => "XT",
            Self::CryptoQuotes => "XQ",
            Self::CryptoL2Book => "XL2",
            Self::IndexValue => "V",
        }
    }

    /// Subscribe parameter for one symbol, e.g. `T.AAPL`.
    pub fn param(self, symbol: &str) -> String {
        format!("{}.{symbol}", self.prefix())
    }
}
