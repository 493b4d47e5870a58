use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use utoipa::ToSchema;

use super::backoff::{Backoff, LiveFeedConfig};
use super::network_client::NetworkClient;
use crate::errors::{FeedError, FeedResult};
use crate::parser::MarketDataParser;
use crate::queue::TickQueue;
use crate::utils::timing::{sleep_for, thread_name};
use crate::utils::validation::validate_symbol;

/// Outbound `{"type":...,"symbol":...}` request, fields in wire order
#[derive(Debug, Serialize)]
struct ControlFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    symbol: &'a str,
}

impl<'a> ControlFrame<'a> {
    fn new(kind: &'static str, symbol: &'a str) -> Self {
        Self { kind, symbol }
    }

    fn encode(&self) -> FeedResult<String> {
        serde_json::to_string(self).map_err(|e| {
            FeedError::InvalidConfiguration(format!("could not encode {} frame: {}", self.kind, e))
        })
    }
}

/// Lifecycle of the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::ShuttingDown => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::ShuttingDown,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Statistics for the live feed connector
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectorStats {
    pub state: ConnectionState,
    pub connect_attempts: u64,
    pub successful_connects: u64,
    pub frames_received: u64,
    pub ticks_enqueued: u64,
    /// Frames that produced no tick (control frames, malformed JSON)
    pub frames_dropped: u64,
    /// Delay before the next reconnect attempt
    pub current_backoff_ms: u64,
}

/// Inbound half: wire frame → parser → queue
///
/// Owned by the client's message callback; kept apart from the connector state
/// so the callback does not keep the client itself alive.
struct InboundPipeline {
    parser: Arc<dyn MarketDataParser>,
    queue: Arc<TickQueue>,
    frames_received: AtomicU64,
    ticks_enqueued: AtomicU64,
    frames_dropped: AtomicU64,
}

impl InboundPipeline {
    fn on_frame(&self, raw: &str) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);

        let ticks = self.parser.parse_frame(raw);
        if ticks.is_empty() {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(parser = self.parser.name(), frame = raw, "Frame produced no ticks");
            return;
        }

        self.ticks_enqueued
            .fetch_add(ticks.len() as u64, Ordering::Relaxed);
        for tick in ticks {
            self.queue.push(tick);
        }
    }
}

/// State shared between the connector handle and its reconnect worker
struct ConnectorShared {
    client: Arc<dyn NetworkClient>,
    inbound: Arc<InboundPipeline>,
    config: LiveFeedConfig,
    /// Subscription set in subscription order
    symbols: Mutex<Vec<String>>,
    running: AtomicBool,
    teardown_requested: AtomicBool,
    state: AtomicU8,
    connect_attempts: AtomicU64,
    successful_connects: AtomicU64,
    current_backoff_ms: AtomicU64,
}

impl ConnectorShared {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn send_subscribe(&self, symbol: &str) -> FeedResult<()> {
        self.client.send(&ControlFrame::new("subscribe", symbol).encode()?)?;
        tracing::info!(symbol, "📬 Subscribed");
        Ok(())
    }

    fn send_unsubscribe(&self, symbol: &str) -> FeedResult<()> {
        self.client.send(&ControlFrame::new("unsubscribe", symbol).encode()?)?;
        tracing::info!(symbol, "📭 Unsubscribed");
        Ok(())
    }

    /// Re-issue the whole subscription set after a (re)connect
    fn resubscribe_all(&self) {
        let symbols = self.symbols.lock().clone();
        for symbol in &symbols {
            if let Err(e) = self.send_subscribe(symbol) {
                tracing::warn!(symbol = %symbol, error = %e, "Resubscribe failed");
            }
        }
    }

    /// Close the connection if open, logging and tolerating failures
    fn disconnect_client(&self) {
        if self.client.is_connected() {
            if let Err(e) = self.client.disconnect() {
                tracing::warn!(error = %e, "Error while disconnecting live feed");
            }
        }
    }

    /// Attempt one connect; on success the subscription set is replayed
    fn try_connect(&self, backoff: &mut Backoff) -> bool {
        self.set_state(ConnectionState::Connecting);
        let attempt = self.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(attempt, "🔌 Connecting to live feed");

        match self.client.connect() {
            Ok(()) => {
                self.successful_connects.fetch_add(1, Ordering::Relaxed);
                backoff.reset();
                self.current_backoff_ms
                    .store(backoff.current().as_millis() as u64, Ordering::Relaxed);
                self.set_state(ConnectionState::Connected);
                tracing::info!(attempt, "✅ Connected to live feed");

                self.resubscribe_all();
                true
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                tracing::warn!(attempt, error = %e, "❌ Live feed connect failed");
                false
            }
        }
    }
}

/// Keeps one live connection open and feeds its trades into the queue
///
/// A single worker thread owns the reconnect loop:
/// - while disconnected it connects, backing off exponentially (capped) between failures
/// - after every successful connect it re-sends the whole subscription set and resets the backoff
/// - while connected it only polls liveness
///
/// Inbound frames never pass through the worker: the client's callback parses
/// them and pushes the resulting ticks straight onto the queue.
pub struct LiveFeedConnector {
    shared: Arc<ConnectorShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LiveFeedConnector {
    pub fn new(
        client: Arc<dyn NetworkClient>,
        parser: Arc<dyn MarketDataParser>,
        queue: Arc<TickQueue>,
        initial_symbols: Vec<String>,
        config: LiveFeedConfig,
    ) -> Self {
        let inbound = Arc::new(InboundPipeline {
            parser,
            queue,
            frames_received: AtomicU64::new(0),
            ticks_enqueued: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        });

        {
            let inbound = Arc::clone(&inbound);
            client.set_message_callback(Arc::new(move |raw: &str| inbound.on_frame(raw)));
        }

        let mut symbols: Vec<String> = Vec::with_capacity(initial_symbols.len());
        for symbol in initial_symbols {
            if validate_symbol(&symbol).is_err() {
                tracing::warn!(symbol = %symbol, "Ignoring invalid initial symbol");
            } else if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        let initial_backoff = config.reconnect.initial_delay_ms;
        let shared = ConnectorShared {
            client,
            inbound,
            config,
            symbols: Mutex::new(symbols),
            running: AtomicBool::new(false),
            teardown_requested: AtomicBool::new(false),
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            connect_attempts: AtomicU64::new(0),
            successful_connects: AtomicU64::new(0),
            current_backoff_ms: AtomicU64::new(initial_backoff),
        };

        Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        }
    }

    /// Start the reconnect worker (no-op if already running)
    pub fn start(&self) -> FeedResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        self.shared.teardown_requested.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(thread_name("live-feed"))
            .spawn(move || ingest_loop(&shared))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                FeedError::Thread(format!("failed to spawn live feed worker: {}", e))
            })?;

        *worker = Some(handle);
        tracing::info!("🚀 Live feed connector started");
        Ok(())
    }

    /// Request teardown, disconnect and join the worker (no-op if not running)
    ///
    /// Disconnect errors are logged and otherwise ignored.
    pub fn stop(&self) {
        let handle = {
            let mut worker = self.worker.lock();
            let Some(handle) = worker.take() else {
                return;
            };
            self.shared.running.store(false, Ordering::Release);
            self.shared.teardown_requested.store(true, Ordering::Release);
            handle
        };
        self.shared.set_state(ConnectionState::ShuttingDown);

        self.shared.disconnect_client();

        if handle.join().is_err() {
            tracing::error!("Live feed worker panicked");
        }

        // A connect that was in flight during the first disconnect may have completed since
        self.shared.disconnect_client();

        self.shared.set_state(ConnectionState::Disconnected);
        tracing::info!("🛑 Live feed connector stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Add `symbol` to the subscription set
    ///
    /// When connected the subscribe frame is sent right away; otherwise it goes
    /// out after the next successful connect. A failed send is returned to the
    /// caller but the symbol stays in the set, so the next connect retries it.
    pub fn subscribe_to_symbol(&self, symbol: &str) -> FeedResult<()> {
        validate_symbol(symbol)?;

        {
            let mut symbols = self.shared.symbols.lock();
            if symbols.iter().any(|s| s == symbol) {
                tracing::debug!(symbol, "Already subscribed");
                return Ok(());
            }
            symbols.push(symbol.to_string());
        }

        if self.shared.client.is_connected() {
            self.shared.send_subscribe(symbol)
        } else {
            tracing::info!(symbol, "Not connected, subscription queued");
            Ok(())
        }
    }

    /// Remove `symbol` from the subscription set
    ///
    /// Returns `false` if it was not subscribed.
    pub fn unsubscribe_from_symbol(&self, symbol: &str) -> bool {
        let removed = {
            let mut symbols = self.shared.symbols.lock();
            match symbols.iter().position(|s| s == symbol) {
                Some(index) => {
                    symbols.remove(index);
                    true
                }
                None => false,
            }
        };

        if removed && self.shared.client.is_connected() {
            if let Err(e) = self.shared.send_unsubscribe(symbol) {
                tracing::warn!(symbol, error = %e, "Unsubscribe frame not sent");
            }
        }
        removed
    }

    pub fn subscribed_symbols(&self) -> Vec<String> {
        self.shared.symbols.lock().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn stats(&self) -> ConnectorStats {
        let inbound = &self.shared.inbound;
        ConnectorStats {
            state: self.shared.state(),
            connect_attempts: self.shared.connect_attempts.load(Ordering::Relaxed),
            successful_connects: self.shared.successful_connects.load(Ordering::Relaxed),
            frames_received: inbound.frames_received.load(Ordering::Relaxed),
            ticks_enqueued: inbound.ticks_enqueued.load(Ordering::Relaxed),
            frames_dropped: inbound.frames_dropped.load(Ordering::Relaxed),
            current_backoff_ms: self.shared.current_backoff_ms.load(Ordering::Relaxed),
        }
    }
}

impl Drop for LiveFeedConnector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ingest_loop(shared: &ConnectorShared) {
    let mut backoff = Backoff::from_config(&shared.config.reconnect);
    let idle_poll = Duration::from_millis(shared.config.idle_poll_ms.max(1));

    while shared.running.load(Ordering::Acquire) {
        if shared.client.is_connected() {
            sleep_for(idle_poll, &shared.teardown_requested);
            continue;
        }

        if shared.state() == ConnectionState::Connected {
            tracing::warn!("⚠️ Live feed connection lost");
            shared.set_state(ConnectionState::Disconnected);
        }

        if shared.try_connect(&mut backoff) {
            if shared.teardown_requested.load(Ordering::Acquire) {
                shared.disconnect_client();
                break;
            }
            continue;
        }

        if shared.teardown_requested.load(Ordering::Acquire) {
            tracing::info!("Teardown requested, leaving reconnect loop");
            break;
        }

        let delay = backoff.next_delay();
        shared
            .current_backoff_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
        tracing::info!(retry_in_ms = delay.as_millis() as u64, "Live feed not connected, retrying");
        sleep_for(delay, &shared.teardown_requested);
    }

    tracing::debug!("Live feed reconnect loop ended");
}
