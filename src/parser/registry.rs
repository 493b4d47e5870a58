use std::collections::BTreeMap;
use std::fmt;

use super::{CsvTickParser, FinnhubTradeParser, GeneratedTickParser, MarketDataParser};
use crate::errors::{FeedError, FeedResult};

/// Constructor stored in the registry
pub type ParserFactory = Box<dyn Fn() -> Box<dyn MarketDataParser> + Send + Sync>;

/// Name → parser constructor lookup
///
/// Built once at startup and handed to whichever component needs to create
/// parsers by name (usually from configuration). There is no global instance.
pub struct ParserRegistry {
    factories: BTreeMap<String, ParserFactory>,
}

impl ParserRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the built-in parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CsvTickParser::NAME, || Box::new(CsvTickParser::new()));
        registry.register(FinnhubTradeParser::NAME, || {
            Box::new(FinnhubTradeParser::new())
        });
        registry.register(GeneratedTickParser::NAME, || {
            Box::new(GeneratedTickParser::new())
        });
        registry
    }

    /// Register (or replace) a constructor under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn MarketDataParser> + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .factories
            .insert(name.clone(), Box::new(factory))
            .is_some()
        {
            tracing::warn!(parser = %name, "Parser factory replaced");
        } else {
            tracing::debug!(parser = %name, "Parser factory registered");
        }
    }

    /// Build a fresh parser instance
    pub fn create(&self, name: &str) -> FeedResult<Box<dyn MarketDataParser>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| FeedError::UnknownParserType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("parsers", &self.names())
            .finish()
    }
}
