// Library crate root
// The binary in main.rs and the integration tests use the crate through these paths
pub mod api;
pub mod config;
pub mod datasource;
pub mod errors;
pub mod market_data;
pub mod models;
pub mod parser;
pub mod queue;
pub mod replay;
pub mod utils;

// pub use = re-export at crate root
pub use api::{create_router, AppState};
pub use config::{AppConfig, FeedSource};
pub use datasource::{LiveFeedConnector, NetworkClient, WsNetworkClient};
pub use errors::{FeedError, FeedResult};
pub use market_data::{DispatchEngine, MarketStatsTracker, TickSubscriber};
pub use models::{SymbolStats, Tick, TickSide};
pub use parser::{MarketDataParser, ParserRegistry};
pub use queue::{BlockingQueue, TickQueue};
pub use replay::{ReplayEngine, ReplayMode, ReplaySource};
