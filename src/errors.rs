//! Error types for the market data pipeline
//!
//! Every component reports failures through [`FeedError`]. The variants fall into
//! the four categories the pipeline distinguishes between:
//!
//! - **Configuration errors**: `InvalidConfiguration`, `UnknownParserType`
//! - **Transient I/O errors**: `Connection`, `NotConnected`
//! - **Data/state errors**: `EmptyQueue`, `UnknownSymbol`
//! - **Resource errors**: `ResourceUnavailable`, `Io`, `Thread`
//!
//! Unparseable records are not errors at all: parsers return `None` and the
//! caller drops the record.

use thiserror::Error;

/// Errors that can occur while configuring or running the feed
#[derive(Debug, Error)]
pub enum FeedError {
    /// A configuration value was rejected (replay factor, generator bounds, symbol names)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Peek on a queue with no elements
    #[error("Queue is empty")]
    EmptyQueue,

    /// The parser registry has no factory under this name
    #[error("Parser type not registered: {0}")]
    UnknownParserType(String),

    /// No statistics have been recorded for this symbol
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Connecting to the live feed failed or timed out
    #[error("Connection error: {0}")]
    Connection(String),

    /// An operation required an open connection
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// A resource required by the operation (e.g. a replay file) is unavailable
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker thread could not be spawned or panicked
    #[error("Thread error: {0}")]
    Thread(String),
}

/// Result alias used across the crate
pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// Returns true if this error was raised while validating configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            FeedError::InvalidConfiguration(_) | FeedError::UnknownParserType(_)
        )
    }

    /// Returns true if retrying the operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::Connection(_) | FeedError::NotConnected(_))
    }

    /// Returns true if the operation failed because a resource was unavailable
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            FeedError::ResourceUnavailable(_) | FeedError::Io(_) | FeedError::Thread(_)
        )
    }
}
