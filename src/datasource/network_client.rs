use crate::errors::FeedResult;
use std::sync::Arc;

/// Handler for inbound text frames
///
/// Called on the client's own thread or task; it must not block.
pub type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Capability the live feed connector needs from a network transport
///
/// All methods take `&self` so the reconnect worker and API callers can share
/// one client behind an `Arc`.
pub trait NetworkClient: Send + Sync {
    /// Open the connection, failing with `FeedError::Connection` on error or timeout
    fn connect(&self) -> FeedResult<()>;

    fn disconnect(&self) -> FeedResult<()>;

    /// Send one text frame; fails with `FeedError::NotConnected` when closed
    fn send(&self, message: &str) -> FeedResult<()>;

    /// Install the inbound frame handler, replacing any previous one
    fn set_message_callback(&self, callback: MessageCallback);

    fn is_connected(&self) -> bool;
}
