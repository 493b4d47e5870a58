use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::stats_tracker::MarketStatsTracker;
use crate::errors::{FeedError, FeedResult};
use crate::models::Tick;
use crate::queue::TickQueue;
use crate::utils::timing::thread_name;

/// Receiver of dispatched ticks
///
/// `on_tick` runs on the dispatcher thread, so it must return promptly:
/// slow work belongs on the subscriber's own thread (see
/// [`FileLoggerSubscriber`]).
pub trait TickSubscriber: Send + Sync {
    fn on_tick(&self, tick: &Tick);

    fn name(&self) -> &str;
}

/// Writes every tick to the tracing log
#[derive(Debug, Default)]
pub struct LoggingSubscriber {
    received: AtomicU64,
}

impl LoggingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl TickSubscriber for LoggingSubscriber {
    fn on_tick(&self, tick: &Tick) {
        self.received.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            symbol = %tick.symbol,
            side = %tick.side,
            price = tick.price,
            quantity = tick.quantity,
            timestamp = %tick.timestamp,
            "📈 Tick"
        );
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Folds ticks into a [`MarketStatsTracker`] that the stats API reads from
#[derive(Debug, Clone)]
pub struct StatsSubscriber {
    tracker: Arc<MarketStatsTracker>,
}

impl StatsSubscriber {
    pub fn new(tracker: Arc<MarketStatsTracker>) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> Arc<MarketStatsTracker> {
        Arc::clone(&self.tracker)
    }
}

impl TickSubscriber for StatsSubscriber {
    fn on_tick(&self, tick: &Tick) {
        self.tracker.update(tick);
    }

    fn name(&self) -> &str {
        "stats"
    }
}

/// Lines buffered before an explicit flush
const FLUSH_EVERY: u64 = 10;

/// Appends one line per tick to a file
///
/// The dispatcher only enqueues; a dedicated writer thread owns the file and
/// drains the queue, so disk latency never stalls the fan-out. Line format:
///
/// ```text
/// 01-15-2024 14:30:00 AAPL BUY 150.25 x100
/// ```
pub struct FileLoggerSubscriber {
    path: PathBuf,
    pending: Arc<TickQueue>,
    lines_written: Arc<AtomicU64>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl FileLoggerSubscriber {
    /// Open (append) `path` and start the writer thread
    ///
    /// Missing parent directories are created. Failure to open the file is
    /// returned here rather than discovered on the first tick.
    pub fn new(path: impl AsRef<Path>) -> FeedResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                FeedError::ResourceUnavailable(format!("{}: {}", parent.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| FeedError::ResourceUnavailable(format!("{}: {}", path.display(), e)))?;

        let pending = Arc::new(TickQueue::new());
        let lines_written = Arc::new(AtomicU64::new(0));

        let writer = {
            let pending = Arc::clone(&pending);
            let lines_written = Arc::clone(&lines_written);
            let path = path.clone();
            thread::Builder::new()
                .name(thread_name("file-logger"))
                .spawn(move || write_loop(file, &path, &pending, &lines_written))
                .map_err(|e| FeedError::Thread(e.to_string()))?
        };

        tracing::info!(path = %path.display(), "📝 File logger started");

        Ok(Self {
            path,
            pending,
            lines_written,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    /// Drain what is pending, flush and stop the writer thread
    pub fn stop(&self) {
        let Some(writer) = self.writer.lock().take() else {
            return;
        };

        self.pending.close();
        if writer.join().is_err() {
            tracing::error!(path = %self.path.display(), "File logger writer thread panicked");
        }

        tracing::info!(
            path = %self.path.display(),
            lines = self.lines_written(),
            "📝 File logger stopped"
        );
    }
}

impl TickSubscriber for FileLoggerSubscriber {
    fn on_tick(&self, tick: &Tick) {
        self.pending.push(tick.clone());
    }

    fn name(&self) -> &str {
        "file_logger"
    }
}

impl Drop for FileLoggerSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Render one tick as a log line (without the newline)
pub fn format_tick_line(tick: &Tick) -> String {
    format!(
        "{} {} {} {:.2} x{}",
        tick.timestamp.format("%m-%d-%Y %H:%M:%S"),
        tick.symbol,
        tick.side,
        tick.price,
        tick.quantity
    )
}

fn write_loop(file: File, path: &Path, pending: &TickQueue, lines_written: &AtomicU64) {
    let mut out = BufWriter::new(file);
    let mut unflushed = 0u64;

    // pop() returns None once the queue is closed and drained
    while let Some(tick) = pending.pop() {
        if let Err(e) = writeln!(out, "{}", format_tick_line(&tick)) {
            tracing::error!(path = %path.display(), error = %e, "Failed to write tick line");
            continue;
        }
        lines_written.fetch_add(1, Ordering::Relaxed);

        unflushed += 1;
        if unflushed >= FLUSH_EVERY {
            if let Err(e) = out.flush() {
                tracing::error!(path = %path.display(), error = %e, "Failed to flush tick log");
            }
            unflushed = 0;
        }
    }

    if let Err(e) = out.flush() {
        tracing::error!(path = %path.display(), error = %e, "Failed to flush tick log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TickSide;
    use chrono::{TimeZone, Utc};

    fn tick(symbol: &str, side: TickSide, price: f64, quantity: i64) -> Tick {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        Tick::new(symbol, side, price, quantity, ts)
    }

    #[test]
    fn test_line_format() {
        let line = format_tick_line(&tick("AAPL", TickSide::Buy, 150.256, 100));
        assert_eq!(line, "01-15-2024 14:30:00 AAPL BUY 150.26 x100");
    }

    #[test]
    fn test_stats_subscriber_updates_tracker() {
        let tracker = Arc::new(MarketStatsTracker::new());
        let subscriber = StatsSubscriber::new(Arc::clone(&tracker));

        subscriber.on_tick(&tick("AAPL", TickSide::Buy, 150.0, 100));
        assert_eq!(tracker.get_stats("AAPL").unwrap().trade_count, 1);
        assert_eq!(subscriber.name(), "stats");
    }

    #[test]
    fn test_logging_subscriber_counts() {
        let subscriber = LoggingSubscriber::new();
        subscriber.on_tick(&tick("AAPL", TickSide::Sell, 1.0, 1));
        subscriber.on_tick(&tick("AAPL", TickSide::Sell, 1.0, 1));
        assert_eq!(subscriber.received(), 2);
    }

    #[test]
    fn test_file_logger_writes_every_tick_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("ticks.log");

        let logger = FileLoggerSubscriber::new(&path).unwrap();
        for i in 0..15 {
            logger.on_tick(&tick("MSFT", TickSide::Sell, 300.0 + i as f64, i));
        }
        logger.stop();
        // Second stop is a no-op
        logger.stop();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 15);
        assert_eq!(lines[0], "01-15-2024 14:30:00 MSFT SELL 300.00 x0");
        assert_eq!(lines[14], "01-15-2024 14:30:00 MSFT SELL 314.00 x14");
        assert_eq!(logger.lines_written(), 15);
    }

    #[test]
    fn test_file_logger_open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let err = FileLoggerSubscriber::new(dir.path()).err().unwrap();
        assert!(err.is_resource_error());
    }
}
