use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

use super::latency::{LatencyStats, LatencyTracker};
use super::stats_tracker::MarketStatsTracker;
use super::subscribers::TickSubscriber;
use crate::errors::{FeedError, FeedResult};
use crate::models::Tick;
use crate::queue::TickQueue;
use crate::utils::timing::thread_name;

/// Dispatcher tuning
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Longest the dispatcher stays parked on an empty queue before it
    /// re-checks the stop flag. Bounds shutdown latency.
    pub poll_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Statistics for the dispatch engine
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DispatchStats {
    pub running: bool,
    /// Registered handles, including weak handles whose subscriber is gone
    pub subscriber_count: usize,
    /// Ticks taken off the queue and fanned out (lifetime)
    pub ticks_dispatched: u64,
    /// Successful `on_tick` calls (lifetime)
    pub deliveries: u64,
    /// `on_tick` calls that panicked (lifetime)
    pub subscriber_failures: u64,
    /// Time to fan one tick out to every subscriber
    pub fanout_latency: LatencyStats,
}

/// Registered subscriber
///
/// A weak handle whose subscriber has been dropped is the empty handle: it
/// stays registered but is skipped during dispatch.
enum SubscriberHandle {
    Strong(Arc<dyn TickSubscriber>),
    Weak(Weak<dyn TickSubscriber>),
}

impl SubscriberHandle {
    fn upgrade(&self) -> Option<Arc<dyn TickSubscriber>> {
        match self {
            SubscriberHandle::Strong(subscriber) => Some(Arc::clone(subscriber)),
            SubscriberHandle::Weak(subscriber) => subscriber.upgrade(),
        }
    }

    /// Identity comparison on the data pointer (vtable pointers are not unique)
    fn refers_to(&self, subscriber: &Arc<dyn TickSubscriber>) -> bool {
        let target = Arc::as_ptr(subscriber) as *const ();
        match self {
            SubscriberHandle::Strong(s) => Arc::as_ptr(s) as *const () == target,
            SubscriberHandle::Weak(w) => w.as_ptr() as *const () == target,
        }
    }
}

/// State shared between the engine handle and its dispatcher thread
struct DispatchShared {
    queue: Arc<TickQueue>,
    subscribers: Mutex<Vec<SubscriberHandle>>,
    running: AtomicBool,
    ticks_dispatched: AtomicU64,
    deliveries: AtomicU64,
    subscriber_failures: AtomicU64,
    fanout_latency: Mutex<LatencyTracker>,
    stats_tracker: Arc<MarketStatsTracker>,
}

impl DispatchShared {
    /// Deliver one tick to every live subscriber, in registration order
    fn dispatch(&self, tick: &Tick) {
        let started = Instant::now();

        self.stats_tracker.update(tick);

        // Copy-on-read: callbacks run without the subscriber lock held
        let snapshot: Vec<Arc<dyn TickSubscriber>> = self
            .subscribers
            .lock()
            .iter()
            .filter_map(SubscriberHandle::upgrade)
            .collect();

        for subscriber in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_tick(tick))) {
                Ok(()) => {
                    self.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    self.subscriber_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        subscriber = subscriber.name(),
                        symbol = %tick.symbol,
                        panic = panic_message(payload.as_ref()),
                        "❌ Subscriber failed while handling tick"
                    );
                }
            }
        }

        self.fanout_latency.lock().record_since(started);
        self.ticks_dispatched.fetch_add(1, Ordering::Relaxed);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Single-threaded fan-out of queued ticks to subscribers
///
/// The engine owns one dispatcher thread that takes ticks off the shared
/// queue and hands each one to every registered subscriber, synchronously and
/// in registration order. The next tick is not dispatched until the previous
/// fan-out has returned.
///
/// Features:
/// - Idempotent `start`/`stop`; `stop` joins the dispatcher thread
/// - Subscriber list protected by its own lock, never held during callbacks
/// - A panicking subscriber is logged and skipped, the rest still receive the tick
/// - Per-symbol ambient statistics and fan-out latency percentiles
///
/// # Example
/// ```ignore
/// let queue = Arc::new(TickQueue::new());
/// let engine = DispatchEngine::new(Arc::clone(&queue));
/// engine.subscribe(Arc::new(LoggingSubscriber::new()));
/// engine.start()?;
///
/// queue.push(tick);
/// ```
pub struct DispatchEngine {
    shared: Arc<DispatchShared>,
    config: DispatchConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchEngine {
    pub fn new(queue: Arc<TickQueue>) -> Self {
        Self::with_config(queue, DispatchConfig::default())
    }

    pub fn with_config(queue: Arc<TickQueue>, config: DispatchConfig) -> Self {
        let shared = DispatchShared {
            queue,
            subscribers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            ticks_dispatched: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            subscriber_failures: AtomicU64::new(0),
            fanout_latency: Mutex::new(LatencyTracker::new("fanout")),
            stats_tracker: Arc::new(MarketStatsTracker::new()),
        };

        tracing::info!(poll_interval = ?config.poll_interval, "📡 DispatchEngine created");

        Self {
            shared: Arc::new(shared),
            config,
            worker: Mutex::new(None),
        }
    }

    /// Start the dispatcher thread (no-op if already running)
    pub fn start(&self) -> FeedResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let poll_interval = self.config.poll_interval;
        let handle = thread::Builder::new()
            .name(thread_name("dispatch"))
            .spawn(move || dispatch_loop(&shared, poll_interval))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                FeedError::Thread(format!("failed to spawn dispatcher: {}", e))
            })?;

        *worker = Some(handle);
        tracing::info!("📡 DispatchEngine started");
        Ok(())
    }

    /// Signal the dispatcher to exit and join it (no-op if not running)
    pub fn stop(&self) {
        let handle = {
            let mut worker = self.worker.lock();
            let Some(handle) = worker.take() else {
                return;
            };
            // Cleared under the worker lock so a concurrent start cannot be cancelled by it
            self.shared.running.store(false, Ordering::Release);
            handle
        };

        if handle.join().is_err() {
            tracing::error!("📡 Dispatcher thread panicked");
        }

        tracing::info!(
            ticks_dispatched = self.shared.ticks_dispatched.load(Ordering::Relaxed),
            "📡 DispatchEngine stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Register a subscriber; it is kept alive by the engine
    pub fn subscribe(&self, subscriber: Arc<dyn TickSubscriber>) {
        tracing::info!(subscriber = subscriber.name(), "📡 Subscriber registered");
        self.shared
            .subscribers
            .lock()
            .push(SubscriberHandle::Strong(subscriber));
    }

    /// Register a subscriber without keeping it alive
    ///
    /// Once the last strong reference is dropped the handle stays registered
    /// but is skipped during dispatch.
    pub fn subscribe_weak(&self, subscriber: &Arc<dyn TickSubscriber>) {
        tracing::info!(subscriber = subscriber.name(), "📡 Weak subscriber registered");
        self.shared
            .subscribers
            .lock()
            .push(SubscriberHandle::Weak(Arc::downgrade(subscriber)));
    }

    /// Remove the first registration of `subscriber`
    ///
    /// Returns `false` (and does nothing else) when it is not registered.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn TickSubscriber>) -> bool {
        let mut subscribers = self.shared.subscribers.lock();
        match subscribers.iter().position(|h| h.refers_to(subscriber)) {
            Some(index) => {
                subscribers.remove(index);
                drop(subscribers);
                tracing::info!(subscriber = subscriber.name(), "📡 Subscriber unregistered");
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Statistics maintained for every dispatched tick, independent of subscribers
    pub fn stats_tracker(&self) -> Arc<MarketStatsTracker> {
        Arc::clone(&self.shared.stats_tracker)
    }

    pub fn queue(&self) -> &Arc<TickQueue> {
        &self.shared.queue
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            running: self.is_running(),
            subscriber_count: self.subscriber_count(),
            ticks_dispatched: self.shared.ticks_dispatched.load(Ordering::Relaxed),
            deliveries: self.shared.deliveries.load(Ordering::Relaxed),
            subscriber_failures: self.shared.subscriber_failures.load(Ordering::Relaxed),
            fanout_latency: self.shared.fanout_latency.lock().stats(),
        }
    }
}

impl Drop for DispatchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(shared: &DispatchShared, poll_interval: Duration) {
    tracing::debug!("📡 Dispatch loop started");

    while shared.running.load(Ordering::Acquire) {
        match shared.queue.pop_timeout(poll_interval) {
            Some(tick) => shared.dispatch(&tick),
            None => {
                // A closed, drained queue returns immediately; avoid spinning on it
                if shared.queue.is_closed() {
                    thread::sleep(poll_interval);
                }
            }
        }
    }

    tracing::debug!("📡 Dispatch loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::subscribers::StatsSubscriber;
    use crate::models::TickSide;
    use chrono::Utc;

    /// Records the symbols it receives, tagged with its own id
    struct RecordingSubscriber {
        id: usize,
        log: Arc<Mutex<Vec<(usize, String)>>>,
    }

    impl TickSubscriber for RecordingSubscriber {
        fn on_tick(&self, tick: &Tick) {
            self.log.lock().push((self.id, tick.symbol.clone()));
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct PanickingSubscriber;

    impl TickSubscriber for PanickingSubscriber {
        fn on_tick(&self, _tick: &Tick) {
            panic!("subscriber blew up");
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn tick(symbol: &str) -> Tick {
        Tick::new(symbol, TickSide::Buy, 100.0, 1, Utc::now())
    }

    fn fast_engine(queue: &Arc<TickQueue>) -> DispatchEngine {
        DispatchEngine::with_config(
            Arc::clone(queue),
            DispatchConfig {
                poll_interval: Duration::from_millis(2),
            },
        )
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met within 5s");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_start_stop_idempotent() {
        let queue = Arc::new(TickQueue::new());
        let engine = fast_engine(&queue);

        assert!(!engine.is_running());
        engine.start().unwrap();
        engine.start().unwrap();
        assert!(engine.is_running());

        engine.stop();
        engine.stop();
        assert!(!engine.is_running());

        // Restart after stop
        engine.start().unwrap();
        assert!(engine.is_running());
    }

    #[test]
    fn test_dispatch_with_no_subscribers() {
        let queue = Arc::new(TickQueue::new());
        let engine = fast_engine(&queue);
        engine.start().unwrap();

        queue.push(tick("AAPL"));
        wait_for(|| engine.stats().ticks_dispatched == 1);

        let stats = engine.stats();
        assert_eq!(stats.deliveries, 0);
        assert_eq!(stats.subscriber_count, 0);
        assert_eq!(engine.stats_tracker().get_stats("AAPL").unwrap().trade_count, 1);
    }

    #[test]
    fn test_fanout_in_registration_order() {
        let queue = Arc::new(TickQueue::new());
        let engine = fast_engine(&queue);
        let log = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            engine.subscribe(Arc::new(RecordingSubscriber {
                id,
                log: Arc::clone(&log),
            }));
        }
        engine.start().unwrap();

        queue.push(tick("AAPL"));
        queue.push(tick("MSFT"));
        wait_for(|| engine.stats().ticks_dispatched == 2);

        let expected = vec![
            (0, "AAPL".to_string()),
            (1, "AAPL".to_string()),
            (2, "AAPL".to_string()),
            (0, "MSFT".to_string()),
            (1, "MSFT".to_string()),
            (2, "MSFT".to_string()),
        ];
        assert_eq!(*log.lock(), expected);
        assert_eq!(engine.stats().deliveries, 6);
    }

    #[test]
    fn test_unsubscribe_twice_is_noop() {
        let queue = Arc::new(TickQueue::new());
        let engine = fast_engine(&queue);
        let subscriber: Arc<dyn TickSubscriber> =
            Arc::new(StatsSubscriber::new(Arc::new(MarketStatsTracker::new())));

        engine.subscribe(Arc::clone(&subscriber));
        assert_eq!(engine.subscriber_count(), 1);

        assert!(engine.unsubscribe(&subscriber));
        assert!(!engine.unsubscribe(&subscriber));
        assert_eq!(engine.subscriber_count(), 0);
    }

    #[test]
    fn test_dropped_weak_subscriber_is_skipped() {
        let queue = Arc::new(TickQueue::new());
        let engine = fast_engine(&queue);
        let log = Arc::new(Mutex::new(Vec::new()));

        let kept: Arc<dyn TickSubscriber> = Arc::new(RecordingSubscriber {
            id: 1,
            log: Arc::clone(&log),
        });
        {
            let dropped: Arc<dyn TickSubscriber> = Arc::new(RecordingSubscriber {
                id: 0,
                log: Arc::clone(&log),
            });
            engine.subscribe_weak(&dropped);
        }
        engine.subscribe(Arc::clone(&kept));
        assert_eq!(engine.subscriber_count(), 2);

        engine.start().unwrap();
        queue.push(tick("AAPL"));
        wait_for(|| engine.stats().ticks_dispatched == 1);

        assert_eq!(*log.lock(), vec![(1, "AAPL".to_string())]);
    }

    #[test]
    fn test_panicking_subscriber_does_not_starve_others() {
        let queue = Arc::new(TickQueue::new());
        let engine = fast_engine(&queue);
        let log = Arc::new(Mutex::new(Vec::new()));

        engine.subscribe(Arc::new(PanickingSubscriber));
        engine.subscribe(Arc::new(RecordingSubscriber {
            id: 7,
            log: Arc::clone(&log),
        }));
        engine.start().unwrap();

        queue.push(tick("AAPL"));
        queue.push(tick("TSLA"));
        wait_for(|| engine.stats().ticks_dispatched == 2);

        let stats = engine.stats();
        assert_eq!(stats.subscriber_failures, 2);
        assert_eq!(stats.deliveries, 2);
        assert!(engine.is_running());
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_stop_is_prompt_on_idle_queue() {
        let queue = Arc::new(TickQueue::new());
        let engine = DispatchEngine::new(Arc::clone(&queue));
        engine.start().unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        engine.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_fanout_latency_recorded() {
        let queue = Arc::new(TickQueue::new());
        let engine = fast_engine(&queue);
        engine.start().unwrap();

        for _ in 0..5 {
            queue.push(tick("AMZN"));
        }
        wait_for(|| engine.stats().ticks_dispatched == 5);

        assert_eq!(engine.stats().fanout_latency.sample_count, 5);
    }

    #[test]
    fn test_concurrent_start_stop_leaves_consistent_state() {
        let queue = Arc::new(TickQueue::new());
        let engine = Arc::new(DispatchEngine::with_config(
            Arc::clone(&queue),
            DispatchConfig {
                poll_interval: Duration::from_millis(1),
            },
        ));

        let togglers: Vec<_> = (0..2)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for _ in 0..100 {
                        engine.start().unwrap();
                        engine.stop();
                    }
                })
            })
            .collect();
        for toggler in togglers {
            toggler.join().unwrap();
        }

        assert!(!engine.is_running());
        engine.start().unwrap();
        assert!(engine.is_running());

        queue.push(Tick::new("AAPL", TickSide::Buy, 1.0, 1, Utc::now()));
        let deadline = Instant::now() + Duration::from_secs(2);
        while engine.stats().ticks_dispatched == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(engine.stats().ticks_dispatched, 1);
        engine.stop();
    }
}
