use futures::{SinkExt, StreamExt};
use market_data_feed::datasource::{
    ConnectionState, LiveFeedConfig, LiveFeedConnector, NetworkClient, ReconnectConfig,
    WsNetworkClient,
};
use market_data_feed::parser::FinnhubTradeParser;
use market_data_feed::queue::TickQueue;
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const TRADE_FRAME: &str =
    r#"{"type":"trade","data":[{"s":"AAPL","p":150.5,"v":10,"t":1705329000000}]}"#;

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Finnhub-like server: answers every subscribe with one trade frame and
/// hangs up on the first connection right after that
fn spawn_mock_server(runtime: &Runtime) -> (Url, mpsc::Receiver<(usize, String)>) {
    let listener = runtime
        .block_on(TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, frames_rx) = mpsc::channel();

    runtime.spawn(async move {
        for connection in 0.. {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };

            while let Some(Ok(message)) = ws.next().await {
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let is_subscribe = text.contains(r#""type":"subscribe""#);
                let _ = frames_tx.send((connection, text));

                if is_subscribe {
                    if ws.send(Message::Text(TRADE_FRAME.to_string())).await.is_err() {
                        break;
                    }
                    if connection == 0 {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            }
        }
    });

    let url = Url::parse(&format!("ws://{}", addr)).unwrap();
    (url, frames_rx)
}

#[test]
fn test_client_send_receive_and_peer_close() {
    let runtime = Runtime::new().unwrap();
    let (url, frames) = spawn_mock_server(&runtime);

    let client = WsNetworkClient::new(url, runtime.handle().clone()).unwrap();
    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&received);
    client.set_message_callback(Arc::new(move |raw: &str| sink.lock().push(raw.to_string())));

    client.connect().unwrap();
    assert!(client.is_connected());

    client
        .send(r#"{"type":"subscribe","symbol":"AAPL"}"#)
        .unwrap();

    let (connection, frame) = frames.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(connection, 0);
    assert_eq!(frame, r#"{"type":"subscribe","symbol":"AAPL"}"#);

    assert!(wait_until(Duration::from_secs(2), || received.lock().len() == 1));
    assert_eq!(received.lock()[0], TRADE_FRAME);

    // The server hangs up after the trade frame
    assert!(wait_until(Duration::from_secs(2), || !client.is_connected()));
    assert!(client.send("late").is_err());

    client.disconnect().unwrap();
    client.disconnect().unwrap();
}

#[test]
fn test_connector_resubscribes_after_reconnect() {
    let runtime = Runtime::new().unwrap();
    let (url, frames) = spawn_mock_server(&runtime);

    let client = Arc::new(
        WsNetworkClient::new(url, runtime.handle().clone())
            .unwrap()
            .with_connect_timeout(Duration::from_secs(2)),
    );
    let queue = Arc::new(TickQueue::new());
    let config = LiveFeedConfig {
        reconnect: ReconnectConfig {
            initial_delay_ms: 50,
            max_delay_ms: 200,
            backoff_multiplier: 2.0,
        },
        idle_poll_ms: 20,
    };
    let connector = LiveFeedConnector::new(
        client,
        Arc::new(FinnhubTradeParser::new()),
        Arc::clone(&queue),
        vec!["AAPL".to_string()],
        config,
    );

    connector.start().unwrap();

    let first = frames.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(first, (0, r#"{"type":"subscribe","symbol":"AAPL"}"#.to_string()));

    // Dropped by the server, reconnected and resubscribed by the connector
    let second = frames.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(second, (1, r#"{"type":"subscribe","symbol":"AAPL"}"#.to_string()));

    assert!(wait_until(Duration::from_secs(2), || queue.len() == 2));
    let tick = queue.try_pop().unwrap();
    assert_eq!(tick.symbol, "AAPL");
    assert_eq!(tick.price, 150.5);
    assert_eq!(tick.quantity, 10);

    assert!(wait_until(Duration::from_secs(2), || connector.state()
        == ConnectionState::Connected));
    let stats = connector.stats();
    assert!(stats.successful_connects >= 2);
    assert_eq!(stats.ticks_enqueued, 2);

    connector.stop();
    assert!(!connector.is_running());
    assert_eq!(connector.state(), ConnectionState::Disconnected);
}
