//! Live market data sources
//!
//! - `network_client` - transport capability the connector is written against
//! - `ws_client` - tokio-tungstenite implementation (Finnhub websocket)
//! - `live_feed` - reconnecting connector that feeds the tick queue
//! - `backoff` - reconnect configuration and capped exponential backoff

pub mod backoff;
pub mod live_feed;
pub mod network_client;
pub mod ws_client;

pub use backoff::{Backoff, LiveFeedConfig, ReconnectConfig};
pub use live_feed::{ConnectionState, ConnectorStats, LiveFeedConnector};
pub use network_client::{MessageCallback, NetworkClient};
pub use ws_client::{finnhub_url, finnhub_url_with_base, WsNetworkClient, FINNHUB_WS_URL};
