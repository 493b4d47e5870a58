use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::errors::FeedError;
use crate::market_data::{DispatchEngine, DispatchStats, MarketStatsTracker};
use crate::queue::QueueStats;

use super::responses::*;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<DispatchEngine>,
    pub stats: Arc<MarketStatsTracker>,
}

impl AppState {
    /// Serve the statistics the dispatcher maintains itself
    pub fn new(dispatcher: Arc<DispatchEngine>) -> Self {
        let stats = dispatcher.stats_tracker();
        Self { dispatcher, stats }
    }
}

/// Convert FeedError to HTTP response
impl IntoResponse for FeedError {
    fn into_response(self) -> Response {
        let status = match &self {
            FeedError::UnknownSymbol(_) => StatusCode::NOT_FOUND,
            FeedError::EmptyQueue => StatusCode::NOT_FOUND,
            FeedError::InvalidConfiguration(_) | FeedError::UnknownParserType(_) => {
                StatusCode::BAD_REQUEST
            }
            FeedError::Connection(_) | FeedError::NotConnected(_) => StatusCode::SERVICE_UNAVAILABLE,
            FeedError::ResourceUnavailable(_) | FeedError::Io(_) | FeedError::Thread(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        dispatcher_running: state.dispatcher.is_running(),
        queue_depth: state.dispatcher.queue().len(),
    })
}

/// Get statistics for one symbol
#[utoipa::path(
    get,
    path = "/api/v1/stats/{symbol}",
    tag = "Statistics",
    params(
        ("symbol" = String, Path, description = "Ticker symbol, e.g. AAPL")
    ),
    responses(
        (status = 200, description = "Symbol statistics", body = SymbolStatsResponse),
        (status = 404, description = "No ticks seen for this symbol", body = ErrorResponse)
    )
)]
pub async fn get_symbol_stats(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<SymbolStatsResponse>, FeedError> {
    let stats = state
        .stats
        .get_stats(&symbol)
        .ok_or_else(|| FeedError::UnknownSymbol(symbol.clone()))?;

    Ok(Json(SymbolStatsResponse::from_stats(symbol, &stats)))
}

/// Get statistics for every symbol
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "Statistics",
    responses(
        (status = 200, description = "Statistics for all symbols", body = AllStatsResponse)
    )
)]
pub async fn get_all_stats(State(state): State<AppState>) -> Json<AllStatsResponse> {
    let symbols: Vec<SymbolStatsResponse> = state
        .stats
        .snapshot()
        .iter()
        .map(|(symbol, stats)| SymbolStatsResponse::from_stats(symbol.as_str(), stats))
        .collect();

    Json(AllStatsResponse {
        count: symbols.len(),
        symbols,
    })
}

/// List symbols with recorded statistics
#[utoipa::path(
    get,
    path = "/api/v1/symbols",
    tag = "Statistics",
    responses(
        (status = 200, description = "Sorted symbol list", body = SymbolListResponse)
    )
)]
pub async fn list_symbols(State(state): State<AppState>) -> Json<SymbolListResponse> {
    let symbols: Vec<String> = state.stats.get_all_symbols().into_iter().collect();
    Json(SymbolListResponse {
        count: symbols.len(),
        symbols,
    })
}

/// Dispatcher counters and fan-out latency
#[utoipa::path(
    get,
    path = "/api/v1/dispatch/stats",
    tag = "Pipeline",
    responses(
        (status = 200, description = "Dispatch engine statistics", body = DispatchStats)
    )
)]
pub async fn get_dispatch_stats(State(state): State<AppState>) -> Json<DispatchStats> {
    Json(state.dispatcher.stats())
}

/// Tick queue depth and lifetime counters
#[utoipa::path(
    get,
    path = "/api/v1/queue/stats",
    tag = "Pipeline",
    responses(
        (status = 200, description = "Tick queue statistics", body = QueueStats)
    )
)]
pub async fn get_queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.dispatcher.queue().stats())
}
