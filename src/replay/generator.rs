use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{FeedError, FeedResult};
use crate::models::{Tick, TickSide};

/// Configuration for synthetic tick generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub symbols: Vec<String>,
    pub base_price: f64,
    /// Prices are drawn uniformly from `base_price ± price_volatility`
    pub price_volatility: f64,
    pub min_quantity: i64,
    pub max_quantity: i64,
    pub num_messages: usize,
    /// Simulated time between consecutive ticks
    pub tick_spacing: Duration,
    /// Fixed seed for a reproducible batch; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            symbols: ["AAPL", "GOOGL", "TSLA", "MSFT", "AMZN", "NFLX", "NVDA", "JPM"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            base_price: 100.0,
            price_volatility: 5.0,
            min_quantity: 1,
            max_quantity: 100,
            num_messages: 100,
            tick_spacing: Duration::from_millis(50),
            seed: Some(1),
        }
    }
}

impl GeneratorConfig {
    /// Reject configurations that cannot produce a meaningful batch
    pub fn validate(&self) -> FeedResult<()> {
        let invalid = |msg: &str| Err(FeedError::InvalidConfiguration(msg.to_string()));

        if self.symbols.is_empty() {
            return invalid("symbol list cannot be empty");
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            return invalid("symbol names cannot be empty");
        }
        if self.num_messages == 0 {
            return invalid("number of messages must be greater than zero");
        }
        if !self.base_price.is_finite() || self.base_price <= 0.0 {
            return invalid("base price must be greater than zero");
        }
        if !self.price_volatility.is_finite() || self.price_volatility < 0.0 {
            return invalid("price volatility cannot be negative");
        }
        if self.base_price - self.price_volatility <= 0.0 {
            return invalid("price volatility must keep the lowest price above zero");
        }
        if self.min_quantity <= 0 || self.max_quantity <= 0 {
            return invalid("quantities must be greater than zero");
        }
        if self.min_quantity > self.max_quantity {
            return invalid("minimum quantity cannot be greater than maximum quantity");
        }
        Ok(())
    }
}

/// Seeded generator of synthetic ticks
pub struct TickGenerator {
    config: GeneratorConfig,
    rng: StdRng,
}

impl TickGenerator {
    /// Validates `config`; an invalid config never produces a generator
    pub fn new(config: GeneratorConfig) -> FeedResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Produce `num_messages` ticks spaced `tick_spacing` apart, starting now
    pub fn generate(&mut self) -> Vec<Tick> {
        let config = &self.config;
        let low = config.base_price - config.price_volatility;
        let high = config.base_price + config.price_volatility;
        let start = Utc::now();
        let spacing = chrono::Duration::from_std(config.tick_spacing)
            .unwrap_or_else(|_| chrono::Duration::zero());

        let mut ticks = Vec::with_capacity(config.num_messages);
        for i in 0..config.num_messages {
            let symbol = &config.symbols[self.rng.random_range(0..config.symbols.len())];
            let price = self.rng.random_range(low..=high);
            let quantity = self
                .rng
                .random_range(config.min_quantity..=config.max_quantity);
            let side = if self.rng.random_bool(0.5) {
                TickSide::Buy
            } else {
                TickSide::Sell
            };

            ticks.push(Tick::new(
                symbol.as_str(),
                side,
                price,
                quantity,
                start + spacing * i as i32,
            ));
        }

        tracing::debug!(count = ticks.len(), "Generated synthetic ticks");
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            num_messages: 50,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = GeneratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbols.len(), 8);
        assert_eq!(config.seed, Some(1));
    }

    #[test]
    fn test_generated_ticks_respect_bounds() {
        let mut generator = TickGenerator::new(config()).unwrap();
        let ticks = generator.generate();

        assert_eq!(ticks.len(), 50);
        for tick in &ticks {
            assert!(generator.config().symbols.contains(&tick.symbol));
            assert!(tick.price >= 95.0 && tick.price <= 105.0);
            assert!(tick.quantity >= 1 && tick.quantity <= 100);
            assert_ne!(tick.side, TickSide::Unknown);
        }
    }

    #[test]
    fn test_timestamps_are_evenly_spaced() {
        let ticks = TickGenerator::new(config()).unwrap().generate();
        for pair in ticks.windows(2) {
            let gap = pair[1].timestamp - pair[0].timestamp;
            assert_eq!(gap.num_milliseconds(), 50);
        }
    }

    #[test]
    fn test_same_seed_same_batch() {
        let a = TickGenerator::new(config()).unwrap().generate();
        let b = TickGenerator::new(config()).unwrap().generate();

        let strip = |ticks: &[Tick]| -> Vec<(String, TickSide, f64, i64)> {
            ticks
                .iter()
                .map(|t| (t.symbol.clone(), t.side, t.price, t.quantity))
                .collect()
        };
        assert_eq!(strip(&a), strip(&b));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let cases = vec![
            GeneratorConfig { symbols: vec![], ..config() },
            GeneratorConfig { num_messages: 0, ..config() },
            GeneratorConfig { base_price: 0.0, ..config() },
            GeneratorConfig { base_price: -10.0, ..config() },
            GeneratorConfig { price_volatility: -1.0, ..config() },
            GeneratorConfig { price_volatility: 100.0, ..config() },
            GeneratorConfig { min_quantity: 0, ..config() },
            GeneratorConfig { max_quantity: -5, ..config() },
            GeneratorConfig { min_quantity: 50, max_quantity: 10, ..config() },
            GeneratorConfig { base_price: f64::NAN, ..config() },
        ];

        for case in cases {
            let err = TickGenerator::new(case.clone()).err().unwrap();
            assert!(err.is_configuration_error(), "accepted {:?}", case);
        }
    }

    #[test]
    fn test_zero_volatility_gives_flat_prices() {
        let mut generator = TickGenerator::new(GeneratorConfig {
            price_volatility: 0.0,
            ..config()
        })
        .unwrap();
        assert!(generator.generate().iter().all(|t| t.price == 100.0));
    }
}
