use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;

/// Millisecond values, upper bound one hour.
fn new_latency_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, 3_600_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Process-wide record of dispatch-to-completion latency, summarized once at
/// shutdown for the end-of-run report.
#[derive(Debug)]
pub struct LatencyRecorder {
    hist: Mutex<Histogram<u64>>,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self {
            hist: Mutex::new(new_latency_histogram()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LatencySummary {
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

impl LatencyRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency: Duration) {
        let ms: u64 = latency.as_millis().try_into().unwrap_or(u64::MAX);
        let mut hist = self.hist.lock();
        let _ = hist.record(ms.max(1));
    }

    #[must_use]
    pub fn summarize(&self) -> LatencySummary {
        let hist = self.hist.lock();
        let count = hist.len();
        let map_val = |v| v as f64;

        LatencySummary {
            p50: (count > 0).then(|| map_val(hist.value_at_quantile(0.50))),
            p90: (count > 0).then(|| map_val(hist.value_at_quantile(0.90))),
            p95: (count > 0).then(|| map_val(hist.value_at_quantile(0.95))),
            p99: (count > 0).then(|| map_val(hist.value_at_quantile(0.99))),
            min: (count > 0).then(|| map_val(hist.min())),
            max: (count > 0).then(|| map_val(hist.max())),
            mean: (count > 0).then(|| hist.mean()),
            stdev: (count > 0).then(|| hist.stdev()),
            count,
        }
    }
}
