//! Process configuration
//!
//! `AppConfig` is read from environment variables (after `dotenvy` has loaded
//! any `.env` file). Every key is optional; missing keys fall back to the
//! defaults below and malformed values are rejected up front.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::datasource::{LiveFeedConfig, ReconnectConfig, FINNHUB_WS_URL};
use crate::errors::{FeedError, FeedResult};
use crate::market_data::DispatchConfig;
use crate::replay::{GeneratorConfig, ReplayMode, ReplaySource};
use crate::utils::validation;

/// Where ticks come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    /// Replay a CSV tick file
    File,
    /// Replay a synthetic batch
    Generated,
    /// Stream trades from Finnhub
    Live,
}

impl FromStr for FeedSource {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(FeedSource::File),
            "generated" => Ok(FeedSource::Generated),
            "live" | "finnhub" => Ok(FeedSource::Live),
            other => Err(FeedError::InvalidConfiguration(format!(
                "unknown feed source: {}",
                other
            ))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_source")]
    pub source: FeedSource,

    /// CSV file replayed when `source` is `file`
    #[serde(default = "default_replay_file")]
    pub replay_file: PathBuf,

    #[serde(default = "default_replay_mode")]
    pub replay_mode: ReplayMode,

    /// Speed-up factor for accelerated and fixed-delay replay
    #[serde(default = "default_replay_factor")]
    pub replay_factor: f64,

    /// Record pacing of file replay, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub replay_base_delay_ms: u64,

    /// Symbols to subscribe to (live) or generate (generated); empty means the generator defaults
    #[serde(default)]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub finnhub_token: Option<String>,

    #[serde(default = "default_finnhub_url")]
    pub finnhub_url: String,

    #[serde(default = "default_api_addr")]
    pub stats_api_addr: SocketAddr,

    /// Tick log written by the file logger subscriber; `None` disables it
    #[serde(default)]
    pub tick_log_file: Option<PathBuf>,

    #[serde(default = "default_dispatch_poll_ms")]
    pub dispatch_poll_ms: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Stop on its own after this many seconds; `None` runs until Ctrl-C
    #[serde(default)]
    pub run_seconds: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            replay_file: default_replay_file(),
            replay_mode: default_replay_mode(),
            replay_factor: default_replay_factor(),
            replay_base_delay_ms: default_base_delay_ms(),
            symbols: Vec::new(),
            finnhub_token: None,
            finnhub_url: default_finnhub_url(),
            stats_api_addr: default_api_addr(),
            tick_log_file: None,
            dispatch_poll_ms: default_dispatch_poll_ms(),
            reconnect: ReconnectConfig::default(),
            run_seconds: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment
    pub fn from_env() -> FeedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup (environment, map in tests)
    pub fn from_lookup<F>(lookup: F) -> FeedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = AppConfig::default();

        if let Some(v) = get("FEED_SOURCE") {
            config.source = v.parse()?;
        }
        if let Some(v) = get("REPLAY_FILE") {
            config.replay_file = PathBuf::from(v);
        }
        if let Some(v) = get("REPLAY_MODE") {
            config.replay_mode = v.parse()?;
        }
        if let Some(v) = get("REPLAY_FACTOR") {
            config.replay_factor = parse_value("REPLAY_FACTOR", &v)?;
        }
        if let Some(v) = get("REPLAY_BASE_DELAY_MS") {
            config.replay_base_delay_ms = parse_value("REPLAY_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = get("FEED_SYMBOLS") {
            config.symbols = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        config.finnhub_token = get("FINNHUB_TOKEN");
        if let Some(v) = get("FINNHUB_URL") {
            config.finnhub_url = v;
        }
        if let Some(v) = get("STATS_API_ADDR") {
            config.stats_api_addr = parse_value("STATS_API_ADDR", &v)?;
        }
        config.tick_log_file = get("TICK_LOG_FILE").map(PathBuf::from);
        if let Some(v) = get("DISPATCH_POLL_MS") {
            config.dispatch_poll_ms = parse_value("DISPATCH_POLL_MS", &v)?;
        }
        if let Some(v) = get("RECONNECT_INITIAL_MS") {
            config.reconnect.initial_delay_ms = parse_value("RECONNECT_INITIAL_MS", &v)?;
        }
        if let Some(v) = get("RECONNECT_MAX_MS") {
            config.reconnect.max_delay_ms = parse_value("RECONNECT_MAX_MS", &v)?;
        }
        if let Some(v) = get("RUN_SECONDS") {
            config.run_seconds = Some(parse_value("RUN_SECONDS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks
    pub fn validate(&self) -> FeedResult<()> {
        if !validation::is_valid_factor(self.replay_factor) {
            return Err(FeedError::InvalidConfiguration(format!(
                "replay factor must be positive, got {}",
                self.replay_factor
            )));
        }
        if self.replay_base_delay_ms == 0 {
            return Err(FeedError::InvalidConfiguration(
                "replay base delay must be greater than zero".to_string(),
            ));
        }
        if validation::scaled_delay(self.replay_base_delay(), self.replay_factor).is_none() {
            return Err(FeedError::InvalidConfiguration(format!(
                "replay factor {} is too small for a {} ms base delay",
                self.replay_factor, self.replay_base_delay_ms
            )));
        }
        if self.dispatch_poll_ms == 0 {
            return Err(FeedError::InvalidConfiguration(
                "dispatch poll interval must be greater than zero".to_string(),
            ));
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(FeedError::InvalidConfiguration(
                "initial reconnect delay cannot exceed the maximum".to_string(),
            ));
        }
        for symbol in &self.symbols {
            validation::validate_symbol(symbol)?;
        }
        if self.source == FeedSource::Live && self.finnhub_token.is_none() {
            return Err(FeedError::InvalidConfiguration(
                "FINNHUB_TOKEN is required for the live feed".to_string(),
            ));
        }
        Ok(())
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        let mut generator = GeneratorConfig::default();
        if !self.symbols.is_empty() {
            generator.symbols = self.symbols.clone();
        }
        generator
    }

    /// Replay source for the `file` and `generated` feeds
    pub fn replay_source(&self) -> ReplaySource {
        match self.source {
            FeedSource::File => ReplaySource::File(self.replay_file.clone()),
            _ => ReplaySource::Generated(self.generator_config()),
        }
    }

    /// Symbols the live feed subscribes to at startup
    pub fn live_symbols(&self) -> Vec<String> {
        if self.symbols.is_empty() {
            self.generator_config().symbols
        } else {
            self.symbols.clone()
        }
    }

    pub fn replay_base_delay(&self) -> Duration {
        Duration::from_millis(self.replay_base_delay_ms)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            poll_interval: Duration::from_millis(self.dispatch_poll_ms),
        }
    }

    pub fn live_feed_config(&self) -> LiveFeedConfig {
        LiveFeedConfig {
            reconnect: self.reconnect.clone(),
            ..LiveFeedConfig::default()
        }
    }

    pub fn run_duration(&self) -> Option<Duration> {
        self.run_seconds.map(Duration::from_secs)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> FeedResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| {
        FeedError::InvalidConfiguration(format!("{} = {:?}: {}", key, value, e))
    })
}

// Default value functions for serde
fn default_source() -> FeedSource {
    FeedSource::Generated
}

fn default_replay_file() -> PathBuf {
    PathBuf::from("data/ticks.csv")
}

fn default_replay_mode() -> ReplayMode {
    ReplayMode::Realtime
}

fn default_replay_factor() -> f64 {
    1.0
}

fn default_base_delay_ms() -> u64 {
    10
}

fn default_finnhub_url() -> String {
    FINNHUB_WS_URL.to_string()
}

fn default_api_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_dispatch_poll_ms() -> u64 {
    10
}
