use super::MarketDataParser;
use crate::models::Tick;

/// Parser for the synthetic generator
///
/// Generated ticks are already typed, so there is no raw format to decode.
#[derive(Debug, Default, Clone)]
pub struct GeneratedTickParser;

impl GeneratedTickParser {
    pub const NAME: &'static str = "generated";

    pub fn new() -> Self {
        Self
    }
}

impl MarketDataParser for GeneratedTickParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse_raw(&self, _raw: &str) -> Option<Tick> {
        None
    }
}
