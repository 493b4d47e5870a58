use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// A single market data event flowing through the pipeline
///
/// Ticks are immutable once built and are moved (or cloned) by value from
/// producers through the queue to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Tick {
    /// Instrument identifier (e.g. "AAPL")
    pub symbol: String,
    pub side: TickSide,
    pub price: f64,
    /// Signed on purpose: zero and negative sizes are passed through untouched
    pub quantity: i64,
    /// Exchange time for live ticks, emission time for replayed ticks
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(
        symbol: impl Into<String>,
        side: TickSide,
        price: f64,
        quantity: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            price,
            quantity,
            timestamp,
        }
    }

    /// Notional value of the tick (price × quantity)
    pub fn notional(&self) -> f64 {
        self.price * self.quantity as f64
    }

    /// Check the structural invariants: finite price and a non-empty symbol
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && !self.symbol.is_empty()
    }

    /// Copy of this tick re-stamped with a new timestamp
    pub fn with_timestamp(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

/// Aggressor side of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickSide {
    Buy,
    Sell,
    /// Feeds such as Finnhub trades carry no side information
    Unknown,
}

impl TickSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickSide::Buy => "BUY",
            TickSide::Sell => "SELL",
            TickSide::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TickSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a side string is not BUY, SELL or UNKNOWN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSideError(pub String);

impl fmt::Display for ParseSideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid tick side: {}", self.0)
    }
}

impl std::error::Error for ParseSideError {}

impl FromStr for TickSide {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(TickSide::Buy),
            "SELL" => Ok(TickSide::Sell),
            "UNKNOWN" => Ok(TickSide::Unknown),
            _ => Err(ParseSideError(s.to_string())),
        }
    }
}
