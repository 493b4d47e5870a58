use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::tick::Tick;

/// Running per-symbol trade statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SymbolStats {
    pub last_price: f64,
    pub total_volume: i64,
    pub trade_count: u64,
    pub high_price: f64,
    pub low_price: f64,
    /// Sum of price × quantity, used for the volume-weighted average
    pub total_notional: f64,
}

impl Default for SymbolStats {
    fn default() -> Self {
        Self {
            last_price: 0.0,
            total_volume: 0,
            trade_count: 0,
            high_price: f64::MIN,
            low_price: f64::MAX,
            total_notional: 0.0,
        }
    }
}

impl SymbolStats {
    /// Fold one tick into the running statistics
    pub fn update(&mut self, tick: &Tick) {
        self.last_price = tick.price;
        self.total_volume += tick.quantity;
        self.trade_count += 1;
        self.high_price = self.high_price.max(tick.price);
        self.low_price = self.low_price.min(tick.price);
        self.total_notional += tick.notional();
    }

    /// Volume-weighted average price, 0.0 until some positive volume is seen
    pub fn average_price(&self) -> f64 {
        if self.total_volume > 0 {
            self.total_notional / self.total_volume as f64
        } else {
            0.0
        }
    }
}
