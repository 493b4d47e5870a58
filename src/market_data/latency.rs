use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use utoipa::ToSchema;

/// Highest trackable value: 10 seconds in nanoseconds
const MAX_TRACKABLE_NS: u64 = 10_000_000_000;
const SIGNIFICANT_FIGURES: u8 = 3;

/// Latency tracker backed by an HDR Histogram
///
/// HDR Histograms give accurate percentiles with a fixed memory footprint, so
/// the dispatcher can record every fan-out without allocating.
pub struct LatencyTracker {
    metric_name: &'static str,
    histogram: Histogram<u64>,
}

impl LatencyTracker {
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            metric_name,
            // 1ns to 10s, 3 significant figures
            histogram: Histogram::new_with_bounds(1, MAX_TRACKABLE_NS, SIGNIFICANT_FIGURES)
                .expect("histogram bounds are static and valid"),
        }
    }

    /// Record the time elapsed since `start`
    #[inline]
    pub fn record_since(&mut self, start: Instant) {
        let nanos = (start.elapsed().as_nanos() as u64).clamp(1, MAX_TRACKABLE_NS);
        let _ = self.histogram.record(nanos);
    }

    pub fn stats(&self) -> LatencyStats {
        LatencyStats {
            metric_name: self.metric_name.to_string(),
            p50_ns: self.histogram.value_at_percentile(50.0),
            p95_ns: self.histogram.value_at_percentile(95.0),
            p99_ns: self.histogram.value_at_percentile(99.0),
            p999_ns: self.histogram.value_at_percentile(99.9),
            max_ns: self.histogram.max(),
            min_ns: self.histogram.min(),
            mean_ns: self.histogram.mean(),
            sample_count: self.histogram.len(),
        }
    }

    pub fn reset(&mut self) {
        self.histogram.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LatencyStats {
    pub metric_name: String,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub p999_ns: u64,
    pub max_ns: u64,
    pub min_ns: u64,
    pub mean_ns: f64,
    pub sample_count: u64,
}

impl LatencyStats {
    pub fn p50_us(&self) -> f64 {
        self.p50_ns as f64 / 1000.0
    }

    pub fn p99_us(&self) -> f64 {
        self.p99_ns as f64 / 1000.0
    }

    pub fn mean_us(&self) -> f64 {
        self.mean_ns / 1000.0
    }
}
