//! Market data parsers
//!
//! Parsers turn source records into [`Tick`]s. They never fail loudly: a record
//! that cannot be understood simply produces no tick, and the caller moves on.
//!
//! - `csv` - comma-separated replay files (`symbol,side,price,quantity,timestampNanos`)
//! - `finnhub` - Finnhub websocket trade frames (JSON)
//! - `generated` - pass-through for ticks that are already typed
//! - `registry` - name → constructor lookup, built once at startup

pub mod csv;
pub mod finnhub;
pub mod generated;
pub mod registry;

pub use self::csv::CsvTickParser;
pub use self::finnhub::FinnhubTradeParser;
pub use self::generated::GeneratedTickParser;
pub use self::registry::{ParserFactory, ParserRegistry};

use crate::models::Tick;

/// Capability shared by every parser: "raw record in, optional typed tick out"
pub trait MarketDataParser: Send + Sync {
    /// Short registry name of this parser
    fn name(&self) -> &'static str;

    /// Parse one raw record
    fn parse_raw(&self, raw: &str) -> Option<Tick>;

    /// Accept an already-typed tick; sources with native ticks pass them through
    fn parse_tick(&self, tick: &Tick) -> Option<Tick> {
        Some(tick.clone())
    }

    /// Parse a frame that may carry several ticks
    fn parse_frame(&self, raw: &str) -> Vec<Tick> {
        self.parse_raw(raw).into_iter().collect()
    }
}
