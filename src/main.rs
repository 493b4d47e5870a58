use market_data_feed::api::{create_router, AppState};
use market_data_feed::config::{AppConfig, FeedSource};
use market_data_feed::datasource::{finnhub_url_with_base, LiveFeedConnector, NetworkClient, WsNetworkClient};
use market_data_feed::market_data::{
    DispatchEngine, FileLoggerSubscriber, LoggingSubscriber, MarketStatsTracker, StatsSubscriber,
    TickSubscriber,
};
use market_data_feed::parser::{MarketDataParser, ParserRegistry};
use market_data_feed::queue::TickQueue;
use market_data_feed::replay::ReplayEngine;
use market_data_feed::{FeedError, FeedResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The component that fills the tick queue
enum Producer {
    Replay(ReplayEngine),
    Live(LiveFeedConnector),
}

impl Producer {
    fn build(
        config: &AppConfig,
        registry: &ParserRegistry,
        queue: Arc<TickQueue>,
        runtime: Handle,
    ) -> FeedResult<Self> {
        match config.source {
            FeedSource::File | FeedSource::Generated => {
                let file_parser: Arc<dyn MarketDataParser> = Arc::from(registry.create("file")?);
                let generated_parser: Arc<dyn MarketDataParser> =
                    Arc::from(registry.create("generated")?);

                let engine = ReplayEngine::for_queue(
                    queue,
                    file_parser,
                    generated_parser,
                    config.replay_source(),
                );
                engine.set_replay_mode(config.replay_mode, config.replay_factor)?;
                engine.set_base_delay(config.replay_base_delay())?;
                Ok(Producer::Replay(engine))
            }
            FeedSource::Live => {
                let token = config.finnhub_token.as_deref().ok_or_else(|| {
                    FeedError::InvalidConfiguration("FINNHUB_TOKEN is not set".to_string())
                })?;
                let url = finnhub_url_with_base(&config.finnhub_url, token)?;
                let client: Arc<dyn NetworkClient> = Arc::new(WsNetworkClient::new(url, runtime)?);
                let parser: Arc<dyn MarketDataParser> = Arc::from(registry.create("finnhub")?);

                Ok(Producer::Live(LiveFeedConnector::new(
                    client,
                    parser,
                    queue,
                    config.live_symbols(),
                    config.live_feed_config(),
                )))
            }
        }
    }

    fn start(&self) -> FeedResult<()> {
        match self {
            Producer::Replay(engine) => engine.start(),
            Producer::Live(connector) => connector.start(),
        }
    }

    fn stop(&self) {
        match self {
            Producer::Replay(engine) => {
                engine.stop();
                tracing::info!("⏹️  Replay stopped");
            }
            Producer::Live(connector) => {
                let stats = connector.stats();
                connector.stop();
                tracing::info!(
                    frames = stats.frames_received,
                    ticks = stats.ticks_enqueued,
                    dropped = stats.frames_dropped,
                    "⏹️  Live feed stopped"
                );
            }
        }
    }
}

fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_data_feed=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run() {
        tracing::error!(error = %e, "❌ Market data feed terminated");
        std::process::exit(1);
    }
}

fn run() -> FeedResult<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(source = ?config.source, mode = %config.replay_mode, "⚙️  Configuration loaded");

    // Producers and the dispatcher run on OS threads; the runtime hosts the
    // stats API and the websocket tasks
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("mdf-runtime")
        .build()?;

    let queue = Arc::new(TickQueue::new());
    let dispatcher = Arc::new(DispatchEngine::with_config(
        Arc::clone(&queue),
        config.dispatch_config(),
    ));

    let logging: Arc<dyn TickSubscriber> = Arc::new(LoggingSubscriber::new());
    let stats = Arc::new(StatsSubscriber::new(Arc::new(MarketStatsTracker::new())));
    dispatcher.subscribe(Arc::clone(&logging));
    dispatcher.subscribe(stats.clone());

    let file_logger = match &config.tick_log_file {
        Some(path) => {
            let subscriber = Arc::new(FileLoggerSubscriber::new(path)?);
            dispatcher.subscribe(subscriber.clone());
            tracing::info!(path = %path.display(), "📝 Tick log enabled");
            Some(subscriber)
        }
        None => None,
    };

    dispatcher.start()?;

    let registry = ParserRegistry::with_defaults();
    let producer = Producer::build(&config, &registry, Arc::clone(&queue), runtime.handle().clone())?;
    producer.start()?;

    let server = serve_api(&runtime, &config, Arc::clone(&dispatcher))?;

    runtime.block_on(wait_for_shutdown(config.run_duration()));

    // Producer first so nothing new is queued, then the dispatcher, then subscribers
    producer.stop();
    dispatcher.stop();
    dispatcher.unsubscribe(&logging);
    if let Some(file_logger) = file_logger {
        file_logger.stop();
        tracing::info!(lines = file_logger.lines_written(), "📝 Tick log closed");
    }

    server.shutdown(&runtime);

    let dispatch_stats = dispatcher.stats();
    tracing::info!(
        dispatched = dispatch_stats.ticks_dispatched,
        failures = dispatch_stats.subscriber_failures,
        p99_us = dispatch_stats.fanout_latency.p99_us(),
        left_in_queue = queue.len(),
        "📊 Dispatch summary"
    );
    for (symbol, symbol_stats) in stats.tracker().snapshot() {
        tracing::info!(
            symbol = %symbol,
            trades = symbol_stats.trade_count,
            volume = symbol_stats.total_volume,
            vwap = symbol_stats.average_price(),
            "📈 Final stats"
        );
    }

    Ok(())
}

/// Running stats API server
struct ApiServer {
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl ApiServer {
    fn shutdown(self, runtime: &Runtime) {
        let _ = self.shutdown.send(());
        match runtime.block_on(self.handle) {
            Ok(Ok(())) => tracing::info!("🛑 Stats API stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Stats API server failed"),
            Err(e) => tracing::error!(error = %e, "Stats API task panicked"),
        }
    }
}

fn serve_api(
    runtime: &Runtime,
    config: &AppConfig,
    dispatcher: Arc<DispatchEngine>,
) -> FeedResult<ApiServer> {
    let app = create_router(AppState::new(dispatcher));
    let addr = config.stats_api_addr;
    let listener = runtime.block_on(tokio::net::TcpListener::bind(addr))?;

    tracing::info!("🚀 Stats API running on http://{}", addr);
    tracing::info!("📊 Symbol stats: http://{}/stats/AAPL", addr);
    tracing::info!("📚 OpenAPI: http://{}/api-docs/openapi.json", addr);

    let (shutdown, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = runtime.spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    Ok(ApiServer { shutdown, handle })
}

async fn wait_for_shutdown(limit: Option<Duration>) {
    let deadline = async {
        match limit {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        },
        _ = deadline => tracing::info!("Run time elapsed, shutting down"),
    }
}
