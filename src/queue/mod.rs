//! Thread-safe hand-off queue
//!
//! The `BlockingQueue` sits between producer threads (replay engine, live feed
//! callback) and the single dispatcher thread.

pub mod blocking_queue;

pub use blocking_queue::{BlockingQueue, QueueStats};

use crate::models::Tick;

/// Queue of ticks shared by producers and the dispatch engine
pub type TickQueue = BlockingQueue<Tick>;
