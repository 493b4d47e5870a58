//! Market data distribution
//!
//! The `DispatchEngine` takes ticks off the shared queue and fans them out to
//! every registered `TickSubscriber` (console log, per-symbol statistics, tick
//! file) on a single dispatcher thread.

pub mod dispatch_engine;
pub mod latency;
pub mod stats_tracker;
pub mod subscribers;

pub use dispatch_engine::{DispatchConfig, DispatchEngine, DispatchStats};
pub use latency::{LatencyStats, LatencyTracker};
pub use stats_tracker::MarketStatsTracker;
pub use subscribers::{FileLoggerSubscriber, LoggingSubscriber, StatsSubscriber, TickSubscriber};
