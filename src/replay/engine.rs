use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::generator::{GeneratorConfig, TickGenerator};
use crate::errors::{FeedError, FeedResult};
use crate::models::Tick;
use crate::parser::MarketDataParser;
use crate::queue::TickQueue;
use crate::utils::timing::{deadline_after, sleep_until, thread_name};
use crate::utils::validation::{is_valid_factor, scaled_delay};

/// Receives raw records from file sources
pub type RawRecordSink = Arc<dyn Fn(&str) + Send + Sync>;
/// Receives typed ticks from generated sources
pub type TickSink = Arc<dyn Fn(Tick) + Send + Sync>;

/// Record pacing of file replay and base of the fixed-delay interval
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);

/// Playback discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Reproduce the original spacing between ticks
    Realtime,
    /// Original spacing divided by the replay factor
    Accelerated,
    /// Constant interval of `base_delay / factor`
    FixedDelay,
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplayMode::Realtime => "realtime",
            ReplayMode::Accelerated => "accelerated",
            ReplayMode::FixedDelay => "fixed_delay",
        };
        f.write_str(s)
    }
}

impl FromStr for ReplayMode {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realtime" => Ok(ReplayMode::Realtime),
            "accelerated" => Ok(ReplayMode::Accelerated),
            "fixed_delay" | "fixed-delay" => Ok(ReplayMode::FixedDelay),
            other => Err(FeedError::InvalidConfiguration(format!(
                "unknown replay mode: {}",
                other
            ))),
        }
    }
}

/// Where replayed ticks come from
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaySource {
    /// Pre-recorded file, one raw record per line
    File(PathBuf),
    /// Synthetic, reproducibly seeded batch
    Generated(GeneratorConfig),
}

/// Outcome of one replay run
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    /// Records loaded for the run
    pub records: usize,
    /// Records handed to a sink before the run ended
    pub emitted: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
struct ReplaySettings {
    mode: ReplayMode,
    factor: f64,
    base_delay: Duration,
    source: ReplaySource,
}

impl ReplaySettings {
    /// Interval between file records, and between ticks in fixed-delay mode
    fn replay_delay(&self) -> Duration {
        match self.mode {
            ReplayMode::Realtime => self.base_delay,
            ReplayMode::Accelerated | ReplayMode::FixedDelay => {
                scaled_delay(self.base_delay, self.factor).unwrap_or(Duration::MAX)
            }
        }
    }
}

/// Records loaded up front, before the worker starts
enum Batch {
    Lines(Vec<String>),
    Ticks(Vec<Tick>),
}

/// Everything a worker needs for one run
struct ReplayRun {
    settings: ReplaySettings,
    batch: Batch,
    raw_sink: RawRecordSink,
    tick_sink: TickSink,
}

impl ReplayRun {
    fn prepare(
        settings: ReplaySettings,
        raw_sink: RawRecordSink,
        tick_sink: TickSink,
    ) -> FeedResult<Self> {
        let batch = match &settings.source {
            ReplaySource::File(path) => {
                let contents = fs::read_to_string(path).map_err(|e| {
                    FeedError::ResourceUnavailable(format!(
                        "could not open replay file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Batch::Lines(contents.lines().map(str::to_owned).collect())
            }
            ReplaySource::Generated(config) => {
                Batch::Ticks(TickGenerator::new(config.clone())?.generate())
            }
        };

        Ok(Self {
            settings,
            batch,
            raw_sink,
            tick_sink,
        })
    }

    fn execute(self, cancel: &AtomicBool) -> ReplaySummary {
        let started = Instant::now();
        let (records, emitted) = match &self.batch {
            Batch::Lines(lines) => (lines.len(), self.replay_lines(lines, cancel)),
            Batch::Ticks(ticks) => (ticks.len(), self.replay_ticks(ticks, cancel)),
        };

        ReplaySummary {
            records,
            emitted,
            cancelled: emitted < records,
            elapsed: started.elapsed(),
        }
    }

    /// Line `i` is emitted at `start + i × replay_delay`
    fn replay_lines(&self, lines: &[String], cancel: &AtomicBool) -> usize {
        let delay = self.settings.replay_delay();
        let start = Instant::now();

        let mut emitted = 0;
        for (i, line) in lines.iter().enumerate() {
            if !sleep_until(deadline_after(start, delay.checked_mul(i as u32)), cancel) {
                break;
            }
            (self.raw_sink)(line);
            emitted += 1;
        }
        emitted
    }

    /// Paced off the first tick's timestamp; every tick is restamped on emission
    fn replay_ticks(&self, ticks: &[Tick], cancel: &AtomicBool) -> usize {
        let Some(first) = ticks.first() else {
            return 0;
        };
        let sim_start = first.timestamp;
        let real_start = Instant::now();
        let interval = self.settings.replay_delay();

        let mut emitted = 0;
        for (i, tick) in ticks.iter().enumerate() {
            let sim_offset = (tick.timestamp - sim_start)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let offset = match self.settings.mode {
                ReplayMode::Realtime => Some(sim_offset),
                ReplayMode::Accelerated => scaled_delay(sim_offset, self.settings.factor),
                ReplayMode::FixedDelay => interval.checked_mul(i as u32),
            };
            let target = deadline_after(real_start, offset);

            if !sleep_until(target, cancel) {
                break;
            }
            (self.tick_sink)(tick.with_timestamp(Utc::now()));
            emitted += 1;
        }
        emitted
    }
}

/// Paced playback of recorded or synthetic ticks
///
/// Each `start` loads the selected source and spawns one worker thread that
/// replays it once. File records go to the raw-record sink untouched; generated
/// ticks go to the tick sink. Pacing uses absolute deadlines so per-record
/// overhead never accumulates into drift, and every sleep re-checks the stop
/// flag so `stop` returns within one sleep slice.
///
/// Settings changed while a run is active apply to the next run.
pub struct ReplayEngine {
    raw_sink: RawRecordSink,
    tick_sink: TickSink,
    settings: Mutex<ReplaySettings>,
    cancel: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<ReplaySummary>>>,
}

impl ReplayEngine {
    pub fn new<R, T>(raw_sink: R, tick_sink: T, source: ReplaySource) -> Self
    where
        R: Fn(&str) + Send + Sync + 'static,
        T: Fn(Tick) + Send + Sync + 'static,
    {
        Self {
            raw_sink: Arc::new(raw_sink),
            tick_sink: Arc::new(tick_sink),
            settings: Mutex::new(ReplaySettings {
                mode: ReplayMode::Realtime,
                factor: 1.0,
                base_delay: DEFAULT_BASE_DELAY,
                source,
            }),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Engine whose sinks parse into `queue`, discarding what the parsers reject
    pub fn for_queue(
        queue: Arc<TickQueue>,
        file_parser: Arc<dyn MarketDataParser>,
        generated_parser: Arc<dyn MarketDataParser>,
        source: ReplaySource,
    ) -> Self {
        let raw_queue = Arc::clone(&queue);
        let raw_sink = move |raw: &str| {
            let ticks = file_parser.parse_frame(raw);
            if ticks.is_empty() {
                tracing::debug!(parser = file_parser.name(), record = raw, "Dropping unparseable record");
            }
            for tick in ticks {
                raw_queue.push(tick);
            }
        };

        let tick_sink = move |tick: Tick| match generated_parser.parse_tick(&tick) {
            Some(tick) => queue.push(tick),
            None => {
                tracing::debug!(parser = generated_parser.name(), symbol = %tick.symbol, "Dropping rejected tick");
            }
        };

        Self::new(raw_sink, tick_sink, source)
    }

    /// Select the playback discipline; `factor` must be finite and positive
    ///
    /// REALTIME ignores the factor but it is still validated.
    pub fn set_replay_mode(&self, mode: ReplayMode, factor: f64) -> FeedResult<()> {
        if !is_valid_factor(factor) {
            return Err(FeedError::InvalidConfiguration(format!(
                "replay factor must be a positive number, got {}",
                factor
            )));
        }

        let mut settings = self.settings.lock();
        if scaled_delay(settings.base_delay, factor).is_none() {
            return Err(FeedError::InvalidConfiguration(format!(
                "replay factor {} stretches the {:?} base delay past the representable range",
                factor, settings.base_delay
            )));
        }
        settings.mode = mode;
        settings.factor = factor;
        tracing::info!(%mode, factor, "⏱️ Replay mode set");
        Ok(())
    }

    pub fn set_source(&self, source: ReplaySource) {
        self.settings.lock().source = source;
    }

    pub fn set_base_delay(&self, base_delay: Duration) -> FeedResult<()> {
        if base_delay.is_zero() {
            return Err(FeedError::InvalidConfiguration(
                "replay base delay must be greater than zero".to_string(),
            ));
        }
        let mut settings = self.settings.lock();
        if scaled_delay(base_delay, settings.factor).is_none() {
            return Err(FeedError::InvalidConfiguration(format!(
                "replay base delay {:?} is out of range for factor {}",
                base_delay, settings.factor
            )));
        }
        settings.base_delay = base_delay;
        Ok(())
    }

    pub fn replay_mode(&self) -> (ReplayMode, f64) {
        let settings = self.settings.lock();
        (settings.mode, settings.factor)
    }

    /// Interval the current settings give between file records
    pub fn replay_delay(&self) -> Duration {
        self.settings.lock().replay_delay()
    }

    /// Load the source and start a run on a worker thread
    ///
    /// No-op while a run is active. A source that cannot be loaded fails here,
    /// before any thread is spawned.
    pub fn start(&self) -> FeedResult<()> {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                return Ok(());
            }
            // Reap the previous, completed run
            if let Some(handle) = worker.take() {
                Self::join_run(handle);
            }
        }

        let settings = self.settings.lock().clone();
        tracing::info!(mode = %settings.mode, factor = settings.factor, source = ?settings.source, "▶️ Starting replay");

        let run = ReplayRun::prepare(
            settings,
            Arc::clone(&self.raw_sink),
            Arc::clone(&self.tick_sink),
        )?;

        self.cancel.store(false, Ordering::Release);
        let cancel = Arc::clone(&self.cancel);
        let handle = thread::Builder::new()
            .name(thread_name("replay"))
            .spawn(move || run.execute(&cancel))
            .map_err(|e| FeedError::Thread(format!("failed to spawn replay worker: {}", e)))?;

        *worker = Some(handle);
        Ok(())
    }

    /// Cancel the active run and join the worker (no-op if none)
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().take() {
            Self::join_run(handle);
        }
    }

    /// Block until the active run finishes on its own
    ///
    /// Returns `None` if no run was started since the last `stop`/`wait`.
    pub fn wait(&self) -> Option<FeedResult<ReplaySummary>> {
        let handle = self.worker.lock().take()?;
        Some(Self::join_run(handle))
    }

    /// Execute one run on the calling thread
    pub fn run_blocking(&self) -> FeedResult<ReplaySummary> {
        let settings = self.settings.lock().clone();
        let run = ReplayRun::prepare(
            settings,
            Arc::clone(&self.raw_sink),
            Arc::clone(&self.tick_sink),
        )?;

        self.cancel.store(false, Ordering::Release);
        let summary = run.execute(&self.cancel);
        log_summary(&summary);
        Ok(summary)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn join_run(handle: JoinHandle<ReplaySummary>) -> FeedResult<ReplaySummary> {
        match handle.join() {
            Ok(summary) => {
                log_summary(&summary);
                Ok(summary)
            }
            Err(_) => {
                tracing::error!("Replay worker panicked");
                Err(FeedError::Thread("replay worker panicked".to_string()))
            }
        }
    }
}

impl Drop for ReplayEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn log_summary(summary: &ReplaySummary) {
    if summary.cancelled {
        tracing::info!(
            emitted = summary.emitted,
            records = summary.records,
            elapsed = ?summary.elapsed,
            "⏹️ Replay cancelled"
        );
    } else {
        tracing::info!(
            emitted = summary.emitted,
            elapsed = ?summary.elapsed,
            "✅ Replay finished"
        );
    }
}
