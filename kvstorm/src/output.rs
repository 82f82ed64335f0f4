use std::collections::BTreeMap;

use kvstorm_metrics::{LatencySummary, WindowStats};
use serde::Serialize;

use crate::cli::OutputFormat;

/// End-of-run rollup handed to the output formatter.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub done: u64,
    pub attempts: u64,
    pub fails: u64,
    /// Cumulative error histogram, sorted by kind.
    pub errors: BTreeMap<String, u64>,
    pub latency_ms: LatencySnapshot,
    pub dropped_metric_events: u64,
}

#[derive(Debug, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

impl RunSummary {
    #[must_use]
    pub fn new(totals: WindowStats, latency: &LatencySummary, dropped_metric_events: u64) -> Self {
        Self {
            done: totals.done,
            attempts: totals.attempts,
            fails: totals.fails,
            errors: totals.errors.into_iter().collect(),
            latency_ms: LatencySnapshot {
                count: latency.count,
                min: latency.min,
                max: latency.max,
                mean: latency.mean,
                stdev: latency.stdev,
                p50: latency.p50,
                p90: latency.p90,
                p95: latency.p95,
                p99: latency.p99,
            },
            dropped_metric_events,
        }
    }
}

pub fn print_summary(format: OutputFormat, summary: &RunSummary) -> anyhow::Result<()> {
    match format {
        OutputFormat::HumanReadable => {
            print_human(summary);
            Ok(())
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
            Ok(())
        }
    }
}

fn print_human(summary: &RunSummary) {
    println!();
    println!(
        "responses: {} (failed {})",
        summary.done, summary.fails
    );
    println!(
        "attempts:  {} (avg {}/op)",
        summary.attempts,
        ratio(summary.attempts, summary.done)
    );

    let lat = &summary.latency_ms;
    println!(
        "latency:   p50={} p90={} p95={} p99={} max={} (n={})",
        ms(lat.p50),
        ms(lat.p90),
        ms(lat.p95),
        ms(lat.p99),
        ms(lat.max),
        lat.count
    );

    if summary.errors.is_empty() {
        println!("errors:    none");
    } else {
        println!("errors:");
        for (kind, count) in &summary.errors {
            println!("  {kind}: {count}");
        }
    }

    if summary.dropped_metric_events > 0 {
        println!(
            "metrics:   {} events dropped (queue full)",
            summary.dropped_metric_events
        );
    }
}

fn ratio(numerator: u64, done: u64) -> String {
    if done == 0 {
        return "-".to_string();
    }
    format!("{:.2}", numerator as f64 / done as f64)
}

fn ms(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.0}ms"),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_sorts_error_kinds() {
        let mut totals = WindowStats {
            done: 10,
            attempts: 12,
            fails: 2,
            ..WindowStats::default()
        };
        totals.errors.insert("redis-MOVED".to_string(), 1);
        totals.errors.insert("net-timeout".to_string(), 1);

        let latency = LatencySummary {
            p50: Some(1.0),
            p90: Some(2.0),
            p95: Some(2.0),
            p99: Some(3.0),
            min: Some(1.0),
            max: Some(3.0),
            mean: Some(1.5),
            stdev: Some(0.5),
            count: 10,
        };

        let summary = RunSummary::new(totals, &latency, 0);
        let kinds: Vec<&String> = summary.errors.keys().collect();
        assert_eq!(kinds, vec!["net-timeout", "redis-MOVED"]);
    }

    #[test]
    fn zero_done_ratio_renders_the_marker() {
        assert_eq!(ratio(5, 0), "-");
        assert_eq!(ratio(6, 4), "1.50");
    }

    #[test]
    fn json_output_is_serializable() {
        let summary = RunSummary::new(
            WindowStats::default(),
            &LatencySummary {
                p50: None,
                p90: None,
                p95: None,
                p99: None,
                min: None,
                max: None,
                mean: None,
                stdev: None,
                count: 0,
            },
            3,
        );

        let json = serde_json::to_string(&summary)
            .unwrap_or_else(|err| panic!("serialize failed: {err}"));
        assert!(json.contains("\"dropped_metric_events\":3"));
    }
}
