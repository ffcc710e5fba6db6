//! Binary to connect to the Polygon stocks feed and subscribe to AAPL and
//! MSFT trades plus SPY minute bars for inspecting live data.
//!
//! # Usage
//!
//! ```sh
//! export POLYGON_API_KEY="your-api-key"
//! cargo run --bin ws_check --features cli
//! ```

use std::env;
use std::time::Duration;

use futures_util::StreamExt;
use polygon_ws::PolygonFeedClient;
use polygon_ws::types::{Feed, Market, Topic};
use tokio::time;

#[tokio::main]
async fn main() -> polygon_ws::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let api_key = env::var("POLYGON_API_KEY").expect("set POLYGON_API_KEY env var before running");
    let feed = match env::var("POLYGON_FEED").as_deref() {
        Ok("delayed") => Feed::Delayed,
        _ => Feed::RealTime,
    };

    let client = PolygonFeedClient::builder(api_key)
        .feed(feed)
        .market(Market::Stocks)
        .build()?;

    println!("Connecting to {}…", client.url());
    client.connect().await?;

    println!("Subscribing to T.AAPL, T.MSFT and AM.SPY…");
    client.subscribe(Topic::StocksTrades, &["AAPL", "MSFT"]).await?;
    client.subscribe(Topic::StocksMinAggs, &["SPY"]).await?;

    let mut events = client.output().expect("output is only taken here");
    let mut errors = client.error();

    println!("Listening for events for 10 seconds…");
    println!("(Note: trades only arrive while the market is open)\n");

    let deadline = time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("\n10 seconds elapsed — disconnecting…");
                break;
            }
            _ = errors.changed() => {
                if let Some(e) = errors.borrow().as_ref() {
                    eprintln!("Fatal: {e}");
                }
            }
            event = events.next() => match event {
                Some(e) => println!("{e:#?}"),
                None => {
                    println!("Stream ended");
                    break;
                }
            },
        }
    }

    client.close().await;
    println!("Done.");

    Ok(())
}
