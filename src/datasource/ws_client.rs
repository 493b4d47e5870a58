use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::network_client::{MessageCallback, NetworkClient};
use crate::errors::{FeedError, FeedResult};

pub const FINNHUB_WS_URL: &str = "wss://ws.finnhub.io";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the Finnhub websocket URL for an API token
pub fn finnhub_url(token: &str) -> FeedResult<Url> {
    finnhub_url_with_base(FINNHUB_WS_URL, token)
}

/// Same as [`finnhub_url`] against a different endpoint (sandbox, local mock)
pub fn finnhub_url_with_base(base: &str, token: &str) -> FeedResult<Url> {
    if token.trim().is_empty() {
        return Err(FeedError::InvalidConfiguration(
            "Finnhub API token is empty".to_string(),
        ));
    }
    Url::parse_with_params(base, &[("token", token)])
        .map_err(|e| FeedError::InvalidConfiguration(format!("invalid websocket URL: {}", e)))
}

/// One open socket: its liveness flag, writer channel and reader task
struct Connection {
    alive: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Ask the writer to send a close frame, then stop reading
    fn close(self) {
        self.alive.store(false, Ordering::Release);
        let _ = self.outbound.send(Message::Close(None));
        self.reader.abort();
    }
}

/// Websocket transport driven on a tokio runtime
///
/// The client is used from plain OS threads: `connect` blocks the calling
/// thread on the runtime (so it must not be called from inside the runtime),
/// while `send` and `disconnect` only hand frames to the writer task and
/// never block. Inbound text frames are passed to the message callback on a
/// runtime worker thread.
pub struct WsNetworkClient {
    url: Url,
    runtime: Handle,
    connect_timeout: Duration,
    callback: Arc<RwLock<Option<MessageCallback>>>,
    connection: Mutex<Option<Connection>>,
}

impl WsNetworkClient {
    pub fn new(url: Url, runtime: Handle) -> FeedResult<Self> {
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(FeedError::InvalidConfiguration(format!(
                    "unsupported websocket scheme: {}",
                    other
                )))
            }
        }

        Ok(Self {
            url,
            runtime,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            callback: Arc::new(RwLock::new(None)),
            connection: Mutex::new(None),
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Endpoint with the query string (API token) stripped, for logs
    fn display_url(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.to_string()
    }
}

impl NetworkClient for WsNetworkClient {
    fn connect(&self) -> FeedResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        // Leftovers from a connection the peer dropped
        if let Some(stale) = self.connection.lock().take() {
            stale.close();
        }

        let endpoint = self.display_url();
        tracing::info!(url = %endpoint, "🔌 Opening websocket");

        let ws_stream = self
            .runtime
            .block_on(async {
                tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await
            })
            .map_err(|_| {
                FeedError::Connection(format!(
                    "connect to {} timed out after {:?}",
                    endpoint, self.connect_timeout
                ))
            })?
            .map(|(stream, _response)| stream)
            .map_err(|e| FeedError::Connection(format!("connect to {} failed: {}", endpoint, e)))?;

        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let alive = Arc::new(AtomicBool::new(true));

        // Writer: drains the outbound channel into the socket
        let writer_alive = Arc::clone(&alive);
        self.runtime.spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(error = %e, "Websocket write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
            writer_alive.store(false, Ordering::Release);
        });

        // Reader: text frames to the callback, pings answered
        let reader_alive = Arc::clone(&alive);
        let callback = Arc::clone(&self.callback);
        let pong_tx = tx.clone();
        let reader = self.runtime.spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::debug!("Ignoring non UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Ping(payload)) => {
                        let _ = pong_tx.send(Message::Pong(payload));
                        continue;
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::info!(?frame, "Websocket closed by peer");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "Websocket read failed");
                        break;
                    }
                };

                let handler = callback.read().clone();
                if let Some(handler) = handler {
                    handler(text.as_str());
                }
            }
            reader_alive.store(false, Ordering::Release);
        });

        *self.connection.lock() = Some(Connection {
            alive,
            outbound: tx,
            reader,
        });

        tracing::info!(url = %endpoint, "✅ Websocket connected");
        Ok(())
    }

    fn disconnect(&self) -> FeedResult<()> {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            let was_alive = connection.alive.load(Ordering::Acquire);
            connection.close();
            if was_alive {
                tracing::info!(url = %self.display_url(), "Websocket disconnected");
            }
        }
        Ok(())
    }

    fn send(&self, message: &str) -> FeedResult<()> {
        let connection = self.connection.lock();
        match connection.as_ref() {
            Some(c) if c.alive.load(Ordering::Acquire) => c
                .outbound
                .send(Message::Text(message.to_string()))
                .map_err(|_| FeedError::NotConnected("websocket writer has stopped".to_string())),
            _ => Err(FeedError::NotConnected(format!(
                "cannot send to {}",
                self.display_url()
            ))),
        }
    }

    fn set_message_callback(&self, callback: MessageCallback) {
        *self.callback.write() = Some(callback);
    }

    fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .map(|c| c.alive.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

impl Drop for WsNetworkClient {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finnhub_url() {
        let url = finnhub_url("abc123").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("ws.finnhub.io"));
        assert_eq!(url.query(), Some("token=abc123"));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(finnhub_url("  ").unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_scheme_validation() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let http = Url::parse("http://localhost:9000").unwrap();
        assert!(WsNetworkClient::new(http, runtime.handle().clone()).is_err());

        let ws = Url::parse("ws://localhost:9000").unwrap();
        let client = WsNetworkClient::new(ws, runtime.handle().clone()).unwrap();
        assert!(!client.is_connected());
        assert!(matches!(client.send("x"), Err(FeedError::NotConnected(_))));
    }

    #[test]
    fn test_connect_failure_is_connection_error() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        // Port 1 on loopback refuses connections
        let url = Url::parse("ws://127.0.0.1:1").unwrap();
        let client = WsNetworkClient::new(url, runtime.handle().clone())
            .unwrap()
            .with_connect_timeout(Duration::from_secs(2));

        let err = client.connect().unwrap_err();
        assert!(err.is_transient());
        assert!(!client.is_connected());
    }
}
