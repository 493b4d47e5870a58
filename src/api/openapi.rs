use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::responses::*;
use crate::market_data::{DispatchStats, LatencyStats};
use crate::queue::QueueStats;

/// OpenAPI specification for the stats endpoint
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Market Data Feed API",
        version = "1.0.0",
        description = "Per-symbol trade statistics and pipeline counters for the market data feed",
        license(
            name = "MIT"
        )
    ),
    paths(
        handlers::health_check,
        handlers::get_symbol_stats,
        handlers::get_all_stats,
        handlers::list_symbols,
        handlers::get_dispatch_stats,
        handlers::get_queue_stats,
    ),
    components(
        schemas(
            SymbolStatsResponse,
            AllStatsResponse,
            SymbolListResponse,
            HealthResponse,
            ErrorResponse,
            DispatchStats,
            LatencyStats,
            QueueStats,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Statistics", description = "Per-symbol trade statistics"),
        (name = "Pipeline", description = "Queue and dispatcher counters"),
    )
)]
pub struct ApiDoc;
