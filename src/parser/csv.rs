use chrono::DateTime;

use super::MarketDataParser;
use crate::models::{Tick, TickSide};

/// Parser for line-oriented replay files
///
/// Expected record: `symbol,side,price,quantity,timestampNanos`. Fields are
/// trimmed; a missing field, an extra field, a bad number or an unknown side
/// makes the whole line unparseable.
#[derive(Debug, Default, Clone)]
pub struct CsvTickParser;

impl CsvTickParser {
    pub const NAME: &'static str = "file";

    pub fn new() -> Self {
        Self
    }

    /// Split a record into exactly five trimmed fields
    fn split_fields(line: &str) -> Option<[&str; 5]> {
        let mut parts = line.split(',').map(str::trim);
        let fields = [
            parts.next()?,
            parts.next()?,
            parts.next()?,
            parts.next()?,
            parts.next()?,
        ];
        if parts.next().is_some() {
            return None;
        }
        Some(fields)
    }
}

impl MarketDataParser for CsvTickParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse_raw(&self, raw: &str) -> Option<Tick> {
        let [symbol, side, price, quantity, timestamp] = Self::split_fields(raw)?;

        if symbol.is_empty() {
            return None;
        }

        let side = side.parse::<TickSide>().ok()?;
        let price = price.parse::<f64>().ok().filter(|p| p.is_finite())?;
        let quantity = quantity.parse::<i64>().ok()?;
        let timestamp = DateTime::from_timestamp_nanos(timestamp.parse::<i64>().ok()?);

        Some(Tick::new(symbol, side, price, quantity, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_line() {
        let parser = CsvTickParser::new();
        let tick = parser
            .parse_raw("AAPL,BUY,150.25,100,1700000000000000000")
            .unwrap();

        assert_eq!(tick.symbol, "AAPL");
        assert_eq!(tick.side, TickSide::Buy);
        assert_eq!(tick.price, 150.25);
        assert_eq!(tick.quantity, 100);
        assert_eq!(tick.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_fields_are_trimmed() {
        let parser = CsvTickParser::new();
        let tick = parser
            .parse_raw("  MSFT , SELL ,  310.5 , 7 , 1000000000 \r")
            .unwrap();

        assert_eq!(tick.symbol, "MSFT");
        assert_eq!(tick.side, TickSide::Sell);
        assert_eq!(tick.quantity, 7);
        assert_eq!(tick.timestamp.timestamp(), 1);
    }

    #[test]
    fn test_malformed_lines_produce_nothing() {
        let parser = CsvTickParser::new();

        assert!(parser.parse_raw("").is_none());
        assert!(parser.parse_raw("AAPL,BUY,150.0,100").is_none());
        assert!(parser.parse_raw("AAPL,HOLD,150.0,100,1").is_none());
        assert!(parser.parse_raw("AAPL,BUY,abc,100,1").is_none());
        assert!(parser.parse_raw("AAPL,BUY,150.0,1.5,1").is_none());
        assert!(parser.parse_raw("AAPL,BUY,150.0,100,yesterday").is_none());
        assert!(parser.parse_raw("AAPL,BUY,NaN,100,1").is_none());
        assert!(parser.parse_raw(",BUY,150.0,100,1").is_none());
        assert!(parser.parse_raw("AAPL,BUY,150.0,100,1,extra").is_none());
    }

    #[test]
    fn test_zero_and_negative_quantity_accepted() {
        let parser = CsvTickParser::new();
        assert_eq!(parser.parse_raw("AAPL,BUY,1.0,0,1").unwrap().quantity, 0);
        assert_eq!(parser.parse_raw("AAPL,SELL,1.0,-3,1").unwrap().quantity, -3);
    }

    #[test]
    fn test_typed_ticks_pass_through() {
        let parser = CsvTickParser::new();
        let tick = parser.parse_raw("AAPL,BUY,1.0,1,1").unwrap();
        assert_eq!(parser.parse_tick(&tick), Some(tick));
    }
}
