//! Replay of recorded and synthetic market data
//!
//! - `engine` - paced playback (REALTIME, ACCELERATED, FIXED_DELAY) on a worker thread
//! - `generator` - seeded synthetic tick batches

pub mod engine;
pub mod generator;

pub use engine::{
    RawRecordSink, ReplayEngine, ReplayMode, ReplaySource, ReplaySummary, TickSink,
    DEFAULT_BASE_DELAY,
};
pub use generator::{GeneratorConfig, TickGenerator};
