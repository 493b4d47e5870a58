use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{SymbolStats, Tick};

/// Per-symbol running statistics
///
/// Backed by a `DashMap` so the dispatcher thread can update while API
/// handlers read without a global lock.
#[derive(Debug, Default)]
pub struct MarketStatsTracker {
    stats: DashMap<String, SymbolStats>,
}

impl MarketStatsTracker {
    pub fn new() -> Self {
        Self {
            stats: DashMap::new(),
        }
    }

    pub fn update(&self, tick: &Tick) {
        self.stats
            .entry(tick.symbol.clone())
            .or_default()
            .update(tick);
    }

    pub fn get_stats(&self, symbol: &str) -> Option<SymbolStats> {
        self.stats.get(symbol).map(|entry| entry.value().clone())
    }

    pub fn get_all_symbols(&self) -> BTreeSet<String> {
        self.stats.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Copy of every symbol's statistics, ordered by symbol
    pub fn snapshot(&self) -> BTreeMap<String, SymbolStats> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn symbol_count(&self) -> usize {
        self.stats.len()
    }

    pub fn reset(&self) {
        self.stats.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TickSide;
    use chrono::Utc;

    fn tick(symbol: &str, price: f64, quantity: i64) -> Tick {
        Tick::new(symbol, TickSide::Buy, price, quantity, Utc::now())
    }

    #[test]
    fn test_unknown_symbol_has_no_stats() {
        let tracker = MarketStatsTracker::new();
        assert!(tracker.get_stats("AAPL").is_none());
        assert!(tracker.get_all_symbols().is_empty());
    }

    #[test]
    fn test_updates_are_grouped_by_symbol() {
        let tracker = MarketStatsTracker::new();
        tracker.update(&tick("AAPL", 150.0, 100));
        tracker.update(&tick("MSFT", 310.0, 10));
        tracker.update(&tick("AAPL", 155.0, 50));

        let aapl = tracker.get_stats("AAPL").unwrap();
        assert_eq!(aapl.trade_count, 2);
        assert_eq!(aapl.last_price, 155.0);
        assert_eq!(tracker.get_stats("MSFT").unwrap().total_volume, 10);

        let symbols: Vec<_> = tracker.get_all_symbols().into_iter().collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(tracker.snapshot().len(), 2);
    }

    #[test]
    fn test_reset() {
        let tracker = MarketStatsTracker::new();
        tracker.update(&tick("AAPL", 150.0, 100));
        tracker.reset();
        assert_eq!(tracker.symbol_count(), 0);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(MarketStatsTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..250 {
                        tracker.update(&tick("AAPL", 100.0, 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = tracker.get_stats("AAPL").unwrap();
        assert_eq!(stats.trade_count, 1000);
        assert_eq!(stats.total_volume, 1000);
    }
}
