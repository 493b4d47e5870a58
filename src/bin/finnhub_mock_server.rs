//! Local stand-in for the Finnhub trade websocket
//!
//! Accepts `{"type":"subscribe","symbol":"AAPL"}` frames and streams synthetic
//! trades for the subscribed symbols once a second. Point the feed at it with
//! `FEED_SOURCE=live FINNHUB_URL=ws://127.0.0.1:8765 FINNHUB_TOKEN=mock`.

use futures::{SinkExt, StreamExt};
use market_data_feed::replay::{GeneratorConfig, TickGenerator};
use market_data_feed::FeedResult;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, Duration};
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADDR: &str = "127.0.0.1:8765";

/// Build one Finnhub trade frame for every subscribed symbol
fn trade_frame(symbols: &BTreeSet<String>) -> Option<String> {
    let config = GeneratorConfig {
        symbols: symbols.iter().cloned().collect(),
        num_messages: symbols.len(),
        seed: None,
        ..GeneratorConfig::default()
    };
    let ticks = TickGenerator::new(config).ok()?.generate();

    let data: Vec<_> = ticks
        .iter()
        .map(|tick| {
            json!({
                "s": tick.symbol,
                "p": (tick.price * 100.0).round() / 100.0,
                "v": tick.quantity,
                "t": tick.timestamp.timestamp_millis(),
            })
        })
        .collect();

    Some(json!({ "type": "trade", "data": data }).to_string())
}

async fn handle_client(stream: TcpStream, peer: SocketAddr) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "Websocket handshake failed");
            return;
        }
    };
    tracing::info!(%peer, "🔌 Client connected");

    let (mut sink, mut source) = ws_stream.split();
    let subscriptions = Arc::new(Mutex::new(BTreeSet::new()));

    let reader_subscriptions = Arc::clone(&subscriptions);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = source.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(request) = serde_json::from_str::<serde_json::Value>(&text) else {
                tracing::debug!(%peer, frame = %text, "Ignoring malformed frame");
                continue;
            };
            let symbol = request["symbol"].as_str().unwrap_or_default().to_string();
            match request["type"].as_str() {
                Some("subscribe") if !symbol.is_empty() => {
                    tracing::info!(%peer, symbol = %symbol, "➕ Subscribed");
                    reader_subscriptions.lock().insert(symbol);
                }
                Some("unsubscribe") => {
                    tracing::info!(%peer, symbol = %symbol, "➖ Unsubscribed");
                    reader_subscriptions.lock().remove(&symbol);
                }
                _ => tracing::debug!(%peer, frame = %text, "Ignoring frame"),
            }
        }
    });

    let mut ticker = interval(Duration::from_secs(1));
    let mut beats: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut reader => break,
            _ = ticker.tick() => {
                beats += 1;
                let frame = if beats % 10 == 0 {
                    // Finnhub interleaves keep-alive frames with trades
                    Some(json!({ "type": "ping" }).to_string())
                } else {
                    let symbols = subscriptions.lock().clone();
                    trade_frame(&symbols)
                };
                if let Some(frame) = frame {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    reader.abort();
    tracing::info!(%peer, "Client disconnected");
}

#[tokio::main]
async fn main() -> FeedResult<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "finnhub_mock_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("MOCK_FEED_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🎭 Mock Finnhub feed listening on ws://{}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(handle_client(stream, peer));
    }
}
