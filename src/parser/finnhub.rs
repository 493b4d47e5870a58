use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::trace;

use super::MarketDataParser;
use crate::models::{Tick, TickSide};

/// Epoch values above this are treated as milliseconds (≈ 2001-09-09 in ms)
const EPOCH_MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Finnhub websocket frame
///
/// `{"type":"trade","data":[{"s":"AAPL","p":150.25,"v":100,"t":1640995200000}]}`
#[derive(Debug, Deserialize)]
struct FinnhubFrame {
    #[serde(rename = "type")]
    frame_type: String,
    /// Elements are decoded one by one so a bad trade does not sink its siblings
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FinnhubTrade {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: f64,
    /// Crypto venues report fractional volume
    #[serde(rename = "v", default)]
    volume: f64,
    #[serde(rename = "t", default)]
    time: Option<i64>,
}

impl FinnhubTrade {
    fn from_element(element: serde_json::Value) -> Option<Tick> {
        match serde_json::from_value::<FinnhubTrade>(element) {
            Ok(trade) => trade.into_tick(),
            Err(e) => {
                trace!(error = %e, "Skipping malformed Finnhub trade");
                None
            }
        }
    }

    fn into_tick(self) -> Option<Tick> {
        if self.symbol.is_empty() || !self.price.is_finite() || !self.volume.is_finite() {
            return None;
        }

        let timestamp = match self.time {
            Some(epoch) => epoch_to_datetime(epoch)?,
            None => Utc::now(),
        };

        Some(Tick::new(
            self.symbol,
            TickSide::Unknown,
            self.price,
            self.volume as i64,
            timestamp,
        ))
    }
}

fn epoch_to_datetime(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(epoch)
    } else {
        DateTime::from_timestamp(epoch, 0)
    }
}

/// Parser for Finnhub trade frames
///
/// Frames of any other `type` (ping, news, errors) and malformed JSON produce
/// no ticks. Finnhub does not publish the aggressor side, so every tick is
/// `TickSide::Unknown`.
#[derive(Debug, Default, Clone)]
pub struct FinnhubTradeParser;

impl FinnhubTradeParser {
    pub const NAME: &'static str = "finnhub";

    pub fn new() -> Self {
        Self
    }

    fn decode_trades(raw: &str) -> Option<Vec<serde_json::Value>> {
        let frame: FinnhubFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(error = %e, "Discarding malformed Finnhub frame");
                return None;
            }
        };

        if frame.frame_type != "trade" {
            trace!(frame_type = %frame.frame_type, "Ignoring non-trade Finnhub frame");
            return None;
        }

        Some(frame.data)
    }
}

impl MarketDataParser for FinnhubTradeParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// First trade of the frame
    fn parse_raw(&self, raw: &str) -> Option<Tick> {
        Self::decode_trades(raw)?
            .into_iter()
            .next()
            .and_then(FinnhubTrade::from_element)
    }

    /// Every well-formed trade of the frame
    fn parse_frame(&self, raw: &str) -> Vec<Tick> {
        Self::decode_trades(raw)
            .map(|trades| trades.into_iter().filter_map(FinnhubTrade::from_element).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trade_frame() {
        let parser = FinnhubTradeParser::new();
        let raw = r#"{"type":"trade","data":[{"s":"AAPL","p":150.25,"v":100,"t":1640995200000}]}"#;

        let tick = parser.parse_raw(raw).unwrap();
        assert_eq!(tick.symbol, "AAPL");
        assert_eq!(tick.price, 150.25);
        assert_eq!(tick.quantity, 100);
        assert_eq!(tick.side, TickSide::Unknown);
        assert_eq!(tick.timestamp.timestamp(), 1_640_995_200);
    }

    #[test]
    fn test_epoch_seconds_are_detected() {
        let parser = FinnhubTradeParser::new();
        let raw = r#"{"type":"trade","data":[{"s":"AAPL","p":1.0,"v":1,"t":1640995200}]}"#;

        let tick = parser.parse_raw(raw).unwrap();
        assert_eq!(tick.timestamp.timestamp(), 1_640_995_200);
    }

    #[test]
    fn test_fractional_volume_is_truncated() {
        let parser = FinnhubTradeParser::new();
        let raw = r#"{"type":"trade","data":[{"s":"BINANCE:BTCUSDT","p":42000.5,"v":2.75,"t":1640995200000}]}"#;

        assert_eq!(parser.parse_raw(raw).unwrap().quantity, 2);
    }

    #[test]
    fn test_frame_with_several_trades() {
        let parser = FinnhubTradeParser::new();
        let raw = r#"{"type":"trade","data":[
            {"s":"AAPL","p":150.0,"v":10,"t":1640995200000},
            {"s":"GOOGL","p":2800.5,"v":5,"t":1640995200001},
            {"s":"","p":1.0,"v":1,"t":1640995200002}
        ]}"#;

        let ticks = parser.parse_frame(raw);
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].symbol, "AAPL");
        assert_eq!(ticks[1].symbol, "GOOGL");

        // parse_raw only yields the first trade
        assert_eq!(parser.parse_raw(raw).unwrap().symbol, "AAPL");
    }

    #[test]
    fn test_malformed_trade_keeps_its_siblings() {
        let parser = FinnhubTradeParser::new();
        let raw = r#"{"type":"trade","data":[
            {"s":"AAPL","v":10,"t":1640995200000},
            {"s":"MSFT","p":410.0,"v":null,"t":1640995200001},
            "garbage",
            {"s":"GOOGL","p":2800.5,"v":5,"t":1640995200002}
        ]}"#;

        let ticks = parser.parse_frame(raw);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].symbol, "GOOGL");
        assert_eq!(ticks[0].price, 2800.5);

        // The first element is the malformed one
        assert!(parser.parse_raw(raw).is_none());
    }

    #[test]
    fn test_non_trade_and_malformed_frames_ignored() {
        let parser = FinnhubTradeParser::new();

        assert!(parser.parse_raw(r#"{"type":"ping"}"#).is_none());
        assert!(parser.parse_raw(r#"{"type":"invalid","data":[{"p":150.25}]}"#).is_none());
        assert!(parser.parse_raw(r#"{"type":"trade","data":[]}"#).is_none());
        assert!(parser.parse_raw(r#"{"type":"trade","data":[{"p":150.25}]}"#).is_none());
        assert!(parser.parse_raw("not json").is_none());
        assert!(parser.parse_frame("{").is_empty());
    }

    #[test]
    fn test_missing_time_uses_receive_time() {
        let parser = FinnhubTradeParser::new();
        let before = Utc::now();
        let tick = parser
            .parse_raw(r#"{"type":"trade","data":[{"s":"AAPL","p":1.0,"v":1}]}"#)
            .unwrap();
        assert!(tick.timestamp >= before);
    }
}
