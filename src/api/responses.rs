use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::SymbolStats;

/// Running statistics for one symbol
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SymbolStatsResponse {
    pub symbol: String,
    pub last_price: f64,
    pub total_volume: i64,
    pub trade_count: u64,
    pub high_price: f64,
    pub low_price: f64,
    /// Volume-weighted average price
    pub average_price: f64,
}

impl SymbolStatsResponse {
    pub fn from_stats(symbol: impl Into<String>, stats: &SymbolStats) -> Self {
        Self {
            symbol: symbol.into(),
            last_price: stats.last_price,
            total_volume: stats.total_volume,
            trade_count: stats.trade_count,
            high_price: stats.high_price,
            low_price: stats.low_price,
            average_price: stats.average_price(),
        }
    }
}

/// Statistics for every symbol seen so far, ordered by symbol
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AllStatsResponse {
    pub symbols: Vec<SymbolStatsResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SymbolListResponse {
    pub symbols: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub dispatcher_running: bool,
    pub queue_depth: usize,
}

/// Error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
