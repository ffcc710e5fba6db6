//! End-to-end tests against an in-process mock feed server.
//!
//! Every test binds a WebSocket server on `127.0.0.1:0`, points a client
//! at it through [`Feed::Custom`] and drives the server side of each
//! connection by hand: status replies, auth checks, data batches and
//! dropped connections.
//!
//! # What is tested
//!
//! - **Streaming** — batches are decoded and forwarded in order
//! - **Subscriptions** — wire format, market validation, replay after reconnect
//! - **Reconnect** — dial failures with backoff, server-side drops, exhaustion
//! - **Heartbeat** — periodic pings, silent peers detected after `pong_wait`
//! - **Auth** — `auth_failed` closes the client without redialing
//! - **Robustness** — malformed messages, a stalled consumer during close

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use polygon_ws::types::{Feed, FeedEvent, Market, Topic};
use polygon_ws::ws::backoff::BackoffConfig;
use polygon_ws::{ConnectionState, PolygonError, PolygonFeedClient, PolygonFeedClientBuilder};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

const API_KEY: &str = "test-key";
const CONNECTED: &str = r#"[{"ev":"status","status":"connected","message":"Connected Successfully"}]"#;
const AUTH_SUCCESS: &str = r#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#;
const AUTH_FAILED: &str = r#"[{"ev":"status","status":"auth_failed","message":"authentication failed"}]"#;
const AUTH_REQUEST: &str = r#"{"action":"auth","params":"test-key"}"#;

/// Upper bound for anything a test waits on.
const STEP: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Mock server
// ---------------------------------------------------------------------------

struct MockServer {
    listener: TcpListener,
    url: String,
}

impl MockServer {
    async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        Self { listener, url }
    }

    /// Accept a TCP connection and hang up before the upgrade.
    async fn refuse(&self) {
        let (tcp, _) = timeout(STEP, self.listener.accept()).await.unwrap().unwrap();
        drop(tcp);
    }

    async fn accept(&self) -> ServerConn {
        let (tcp, _) = timeout(STEP, self.listener.accept()).await.unwrap().unwrap();
        ServerConn {
            ws: accept_async(tcp).await.unwrap(),
        }
    }

    /// Accept and run the happy-path handshake.
    async fn accept_authenticated(&self) -> ServerConn {
        let mut conn = self.accept().await;
        conn.send(CONNECTED).await;
        assert_eq!(conn.recv().await, AUTH_REQUEST);
        conn.send(AUTH_SUCCESS).await;
        conn
    }

    async fn assert_no_dial(&self, wait: Duration) {
        assert!(
            timeout(wait, self.listener.accept()).await.is_err(),
            "client dialed again"
        );
    }
}

struct ServerConn {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConn {
    async fn send(&mut self, text: &str) {
        self.ws.send(Message::text(text.to_owned())).await.unwrap();
    }

    async fn next_text(&mut self) -> Option<String> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    }

    async fn recv(&mut self) -> String {
        timeout(STEP, self.next_text())
            .await
            .expect("timed out waiting for a client message")
            .expect("client closed the connection")
    }

    /// Wait for `count` pings, skipping other frames.
    async fn expect_pings(&mut self, count: usize) {
        let mut pings = 0;
        while pings < count {
            match timeout(STEP, self.ws.next())
                .await
                .expect("timed out waiting for a ping")
            {
                Some(Ok(Message::Ping(_))) => pings += 1,
                Some(Ok(_)) => {}
                other => panic!("connection ended while waiting for pings: {other:?}"),
            }
        }
    }

    async fn assert_quiet(&mut self, wait: Duration) {
        if let Ok(Some(text)) = timeout(wait, self.next_text()).await {
            panic!("unexpected client message: {text}");
        }
    }
}

fn builder(server: &MockServer) -> PolygonFeedClientBuilder {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    PolygonFeedClient::builder(API_KEY)
        .feed(Feed::Custom(server.url.clone()))
        .market(Market::Stocks)
        .dial_timeout(Duration::from_secs(2))
        .reconnect(BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_retries: Some(5),
        })
}

async fn connected(server: &MockServer) -> (PolygonFeedClient, ServerConn) {
    let client = builder(server).build().unwrap();
    let (res, conn) = tokio::join!(client.connect(), server.accept_authenticated());
    res.unwrap();
    (client, conn)
}

async fn wait_for_state(client: &PolygonFeedClient, want: ConnectionState) {
    timeout(STEP, async {
        while client.state() != want {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("client never reached {want:?}, stuck at {:?}", client.state()));
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_is_forwarded_in_order() {
    let server = MockServer::bind().await;
    let (client, mut conn) = connected(&server).await;
    let mut events = client.output().unwrap();

    client
        .subscribe(Topic::StocksTrades, &["AAPL", "MSFT"])
        .await
        .unwrap();
    assert_eq!(
        conn.recv().await,
        r#"{"action":"subscribe","params":"T.AAPL,T.MSFT"}"#
    );

    conn.send(
        r#"[{"ev":"T","sym":"AAPL","p":189.5,"s":100,"t":1700000000000},
            {"ev":"T","sym":"MSFT","p":370.1,"s":5,"t":1700000000001}]"#,
    )
    .await;

    let first = timeout(STEP, events.recv()).await.unwrap().unwrap();
    let second = timeout(STEP, events.recv()).await.unwrap().unwrap();
    assert_eq!(first.symbol(), Some("AAPL"));
    assert_eq!(second.symbol(), Some("MSFT"));
    assert_eq!(first.event_type(), Some("T"));

    client.close().await;
    assert!(timeout(STEP, events.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn raw_mode_forwards_undecoded_messages() {
    let server = MockServer::bind().await;
    let client = builder(&server).raw_data(true).build().unwrap();
    let (res, mut conn) = tokio::join!(client.connect(), server.accept_authenticated());
    res.unwrap();
    let mut events = client.output().unwrap();

    conn.send(r#"[{"ev":"NEW","x":1}]"#).await;

    let event = timeout(STEP, events.next()).await.unwrap().unwrap();
    let FeedEvent::Raw(raw) = event else {
        panic!("expected a raw event");
    };
    assert_eq!(&raw[..], br#"{"ev":"NEW","x":1}"#);
    client.close().await;
}

#[tokio::test]
async fn malformed_messages_do_not_break_the_connection() {
    let server = MockServer::bind().await;
    let (client, mut conn) = connected(&server).await;
    let mut events = client.output().unwrap();

    conn.send("this is not json").await;
    conn.send(r#"[{"ev":"T","sym":"AAPL","p":"not-a-price","t":1}]"#).await;
    conn.send(r#"[{"ev":"T","sym":"NVDA","p":480.0,"t":2}]"#).await;

    let event = timeout(STEP, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.symbol(), Some("NVDA"));
    assert_eq!(client.state(), ConnectionState::Connected);
    server.assert_no_dial(Duration::from_millis(100)).await;

    client.close().await;
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_topic_is_rejected_before_the_wire() {
    let server = MockServer::bind().await;
    let (client, mut conn) = connected(&server).await;

    let err = client
        .subscribe(Topic::OptionsTrades, &["O:SPY241220C00600000"])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PolygonError::TopicNotSupported {
            market: Market::Stocks,
            topic: Topic::OptionsTrades
        }
    ));
    assert!(client.subscriptions().is_empty());

    client.subscribe(Topic::StocksQuotes, &[]).await.unwrap();
    assert_eq!(
        conn.recv().await,
        r#"{"action":"subscribe","params":"Q.*"}"#
    );

    client.close().await;
}

#[tokio::test]
async fn unsubscribe_is_sent_and_recorded() {
    let server = MockServer::bind().await;
    let (client, mut conn) = connected(&server).await;

    client
        .subscribe(Topic::StocksMinAggs, &["AAPL", "TSLA"])
        .await
        .unwrap();
    client.unsubscribe(Topic::StocksMinAggs, &["TSLA"]).await.unwrap();

    assert_eq!(
        conn.recv().await,
        r#"{"action":"subscribe","params":"AM.AAPL,AM.TSLA"}"#
    );
    assert_eq!(
        conn.recv().await,
        r#"{"action":"unsubscribe","params":"AM.TSLA"}"#
    );
    assert_eq!(
        client.subscriptions(),
        vec![(Topic::StocksMinAggs, vec!["AAPL".to_owned()])]
    );

    client.close().await;
}

#[tokio::test]
async fn concurrent_changes_reach_the_server_in_registry_order() {
    let server = MockServer::bind().await;
    let client = builder(&server).outbound_capacity(1).build().unwrap();
    let (res, mut conn) = tokio::join!(client.connect(), server.accept_authenticated());
    res.unwrap();

    let changes = (0..40).map(|i| {
        let client = &client;
        async move {
            let symbol = if i % 3 == 0 { "MSFT" } else { "AAPL" };
            if i % 2 == 0 {
                client.subscribe(Topic::StocksTrades, &[symbol]).await
            } else {
                client.unsubscribe(Topic::StocksTrades, &[symbol]).await
            }
        }
    });
    for res in join_all(changes).await {
        res.unwrap();
    }

    let mut server_view = BTreeSet::new();
    for _ in 0..40 {
        let msg: serde_json::Value = serde_json::from_str(&conn.recv().await).unwrap();
        let symbol = msg["params"].as_str().unwrap().trim_start_matches("T.").to_owned();
        match msg["action"].as_str().unwrap() {
            "subscribe" => server_view.insert(symbol),
            "unsubscribe" => server_view.remove(&symbol),
            other => panic!("unexpected action {other}"),
        };
    }

    let registry: Vec<String> = client
        .subscriptions()
        .into_iter()
        .find(|(topic, _)| *topic == Topic::StocksTrades)
        .map(|(_, symbols)| symbols)
        .unwrap_or_default();
    assert_eq!(server_view.into_iter().collect::<Vec<_>>(), registry);

    client.close().await;
}

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dial_failures_are_retried_and_registry_replayed_once() {
    let server = MockServer::bind().await;
    let client = builder(&server).build().unwrap();
    client
        .subscribe(Topic::StocksTrades, &["AAPL", "MSFT"])
        .await
        .unwrap();

    let server_side = async {
        for _ in 0..3 {
            server.refuse().await;
        }
        server.accept_authenticated().await
    };
    let (res, mut conn) = tokio::join!(client.connect(), server_side);
    res.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    assert_eq!(
        conn.recv().await,
        r#"{"action":"subscribe","params":"T.AAPL,T.MSFT"}"#
    );
    conn.assert_quiet(Duration::from_millis(200)).await;

    client.close().await;
}

#[tokio::test]
async fn server_drop_restores_subscriptions_on_new_connection() {
    let server = MockServer::bind().await;
    let (client, mut conn) = connected(&server).await;
    let mut events = client.output().unwrap();

    client.subscribe(Topic::StocksTrades, &["AAPL"]).await.unwrap();
    client.subscribe(Topic::StocksQuotes, &["MSFT"]).await.unwrap();
    conn.recv().await;
    conn.recv().await;
    drop(conn);

    let mut conn = server.accept_authenticated().await;
    let mut replayed = vec![conn.recv().await, conn.recv().await];
    replayed.sort();
    assert_eq!(
        replayed,
        vec![
            r#"{"action":"subscribe","params":"Q.MSFT"}"#.to_owned(),
            r#"{"action":"subscribe","params":"T.AAPL"}"#.to_owned(),
        ]
    );
    wait_for_state(&client, ConnectionState::Connected).await;

    // The same output stream keeps flowing across connections.
    conn.send(r#"[{"ev":"T","sym":"AAPL","p":1.0,"t":1}]"#).await;
    let event = timeout(STEP, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.symbol(), Some("AAPL"));

    client.close().await;
}

#[tokio::test]
async fn exhausted_reconnects_close_the_client() {
    let server = MockServer::bind().await;
    let client = builder(&server)
        .max_reconnect_attempts(Some(2))
        .build()
        .unwrap();
    let (res, conn) = tokio::join!(client.connect(), server.accept_authenticated());
    res.unwrap();
    let mut events = client.output().unwrap();
    let mut errors = client.error();

    drop(conn);
    drop(server);

    timeout(STEP, errors.changed()).await.unwrap().unwrap();
    let err = errors.borrow().clone().expect("fatal error published");
    assert!(
        matches!(*err, PolygonError::ReconnectExhausted { attempts: 3, .. }),
        "unexpected error: {err}"
    );

    wait_for_state(&client, ConnectionState::Closed).await;
    assert!(timeout(STEP, events.recv()).await.unwrap().is_none());
    assert!(matches!(
        client.subscribe(Topic::StocksTrades, &[]).await,
        Err(PolygonError::Closed)
    ));
}

#[tokio::test]
async fn initial_connect_gives_up_and_stays_unconnected() {
    let server = MockServer::bind().await;
    let client = builder(&server)
        .max_reconnect_attempts(Some(1))
        .build()
        .unwrap();

    let server_side = async {
        server.refuse().await;
        server.refuse().await;
    };
    let (res, ()) = tokio::join!(client.connect(), server_side);

    assert!(matches!(
        res,
        Err(PolygonError::ReconnectExhausted { attempts: 2, .. })
    ));
    assert_eq!(client.state(), ConnectionState::Unconnected);

    // A later attempt can still succeed.
    let (res, _conn) = tokio::join!(client.connect(), server.accept_authenticated());
    res.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    client.close().await;
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auth_failed_closes_without_redialing() {
    let server = MockServer::bind().await;
    let client = builder(&server).build().unwrap();
    let mut events = client.output().unwrap();

    let server_side = async {
        let mut conn = server.accept().await;
        conn.send(CONNECTED).await;
        assert_eq!(conn.recv().await, AUTH_REQUEST);
        conn.send(AUTH_FAILED).await;
        conn
    };
    let (res, _conn) = tokio::join!(client.connect(), server_side);

    assert!(matches!(res, Err(PolygonError::AuthFailed(ref m)) if m == "authentication failed"));
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(timeout(STEP, events.recv()).await.unwrap().is_none());
    assert!(matches!(
        client.error().borrow().as_deref(),
        Some(PolygonError::AuthFailed(_))
    ));
    server.assert_no_dial(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn auth_failed_mid_stream_is_fatal() {
    let server = MockServer::bind().await;
    let (client, mut conn) = connected(&server).await;
    let mut events = client.output().unwrap();
    let mut errors = client.error();

    conn.send(AUTH_FAILED).await;

    timeout(STEP, errors.changed()).await.unwrap().unwrap();
    assert!(matches!(
        errors.borrow().as_deref(),
        Some(PolygonError::AuthFailed(_))
    ));
    assert!(timeout(STEP, events.recv()).await.unwrap().is_none());
    wait_for_state(&client, ConnectionState::Closed).await;
    server.assert_no_dial(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn unexpected_first_status_is_a_handshake_error() {
    let server = MockServer::bind().await;
    let client = builder(&server)
        .max_reconnect_attempts(Some(0))
        .build()
        .unwrap();

    let server_side = async {
        let mut conn = server.accept().await;
        conn.send(r#"[{"ev":"status","status":"max_connections","message":"too many"}]"#)
            .await;
        conn
    };
    let (res, _conn) = tokio::join!(client.connect(), server_side);

    let err = res.unwrap_err();
    assert!(
        matches!(&err, PolygonError::ReconnectExhausted { attempts: 1, last } if last.contains("handshake")),
        "unexpected error: {err}"
    );
    assert_eq!(client.state(), ConnectionState::Unconnected);
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pings_are_sent_every_interval() {
    let server = MockServer::bind().await;
    let client = builder(&server)
        .ping_interval(Duration::from_millis(50))
        .pong_wait(Duration::from_millis(500))
        .build()
        .unwrap();
    let (res, mut conn) = tokio::join!(client.connect(), server.accept_authenticated());
    res.unwrap();

    let started = Instant::now();
    conn.expect_pings(3).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "pings too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "pings too slow: {elapsed:?}");

    assert_eq!(client.state(), ConnectionState::Connected);
    server.assert_no_dial(Duration::from_millis(100)).await;
    client.close().await;
}

#[tokio::test]
async fn silent_peer_triggers_reconnect_and_replay() {
    let server = MockServer::bind().await;
    let client = builder(&server)
        .ping_interval(Duration::from_millis(50))
        .pong_wait(Duration::from_millis(200))
        .build()
        .unwrap();
    let (res, mut stalled) = tokio::join!(client.connect(), server.accept_authenticated());
    res.unwrap();

    client.subscribe(Topic::StocksTrades, &["AAPL"]).await.unwrap();
    assert_eq!(
        stalled.recv().await,
        r#"{"action":"subscribe","params":"T.AAPL"}"#
    );

    // `stalled` stays open but is never read again, so no pong comes back.
    let mut conn = server.accept_authenticated().await;
    assert_eq!(
        conn.recv().await,
        r#"{"action":"subscribe","params":"T.AAPL"}"#
    );
    wait_for_state(&client, ConnectionState::Connected).await;

    client.close().await;
    drop(stalled);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_does_not_wait_for_a_stalled_consumer() {
    let server = MockServer::bind().await;
    let client = builder(&server).output_capacity(1).build().unwrap();
    let (res, mut conn) = tokio::join!(client.connect(), server.accept_authenticated());
    res.unwrap();
    let mut events = client.output().unwrap();

    let batch: Vec<String> = (0..50)
        .map(|i| format!(r#"{{"ev":"T","sym":"S{i}","p":1.0,"t":{i}}}"#))
        .collect();
    conn.send(&format!("[{}]", batch.join(","))).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    timeout(STEP, client.close())
        .await
        .expect("close blocked on a full output queue");
    assert_eq!(client.state(), ConnectionState::Closed);

    // Whatever was queued is still delivered, then the stream ends.
    let mut drained = 0;
    while timeout(STEP, events.recv()).await.unwrap().is_some() {
        drained += 1;
    }
    assert!(drained <= 1);
}

#[tokio::test]
async fn slow_consumer_loses_nothing() {
    let server = MockServer::bind().await;
    let client = builder(&server).output_capacity(2).build().unwrap();
    let (res, mut conn) = tokio::join!(client.connect(), server.accept_authenticated());
    res.unwrap();
    let mut events = client.output().unwrap();

    for chunk in 0..4 {
        let batch: Vec<String> = (0..5)
            .map(|i| {
                let n = chunk * 5 + i;
                format!(r#"{{"ev":"T","sym":"S{n}","p":1.0,"t":{n}}}"#)
            })
            .collect();
        conn.send(&format!("[{}]", batch.join(","))).await;
    }

    for n in 0..20 {
        tokio::time::sleep(Duration::from_millis(2)).await;
        let event = timeout(STEP, events.recv()).await.unwrap().unwrap();
        assert_eq!(event.symbol(), Some(format!("S{n}").as_str()));
    }
    client.close().await;
}

#[tokio::test]
async fn connect_is_idempotent_and_close_sends_close_frame() {
    let server = MockServer::bind().await;
    let (client, mut conn) = connected(&server).await;

    client.connect().await.unwrap();
    server.assert_no_dial(Duration::from_millis(100)).await;

    client.close().await;
    assert!(timeout(STEP, conn.next_text()).await.unwrap().is_none());
    assert!(matches!(client.connect().await, Err(PolygonError::Closed)));
}
