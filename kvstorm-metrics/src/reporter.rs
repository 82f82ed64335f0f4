use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::context::OpContext;
use crate::error_kind::ErrorKind;
use crate::log::LogSink;
use crate::signal::StopSignal;

/// Indentation applied to every line of the error-map block.
const ERR_BLOCK_INDENT: usize = 8;
/// Column the dashed separator pads each error kind out to.
const ERR_KEY_WIDTH: usize = 70;
/// Pause after emitting a report, decoupling tick cadence from formatting
/// cost.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// One drained reporting window (also the shape of the cumulative totals).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowStats {
    pub done: u64,
    pub attempts: u64,
    pub fails: u64,
    pub errors: AHashMap<String, u64>,
}

/// Concurrency-safe accumulator of attempt/success/failure counts and
/// per-error-kind counts.
///
/// Producers increment the current window; a single background cycle drains
/// it on a fixed interval, folds it into the cumulative totals, and emits a
/// windowed plus an all-time summary line to the log sink. Construct one per
/// process and hand out `Arc` clones.
pub struct Reporter {
    log: Arc<dyn LogSink>,
    tick_id: AtomicU32,
    curr_done: AtomicU64,
    curr_attempts: AtomicU64,
    curr_fail: AtomicU64,
    window_errors: Mutex<AHashMap<String, u64>>,
    totals: Mutex<WindowStats>,
}

impl Reporter {
    #[must_use]
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            log,
            tick_id: AtomicU32::new(0),
            curr_done: AtomicU64::new(0),
            curr_attempts: AtomicU64::new(0),
            curr_fail: AtomicU64::new(0),
            window_errors: Mutex::new(AHashMap::new()),
            totals: Mutex::new(WindowStats::default()),
        }
    }

    /// Record one store call: its attempt count plus any per-attempt errors.
    ///
    /// Callers block only for the error-map critical section, and only when
    /// `errors` is non-empty.
    pub fn add_stat(&self, errors: Vec<ErrorKind>, attempts: u64) {
        self.curr_attempts.fetch_add(attempts, Ordering::Relaxed);

        if errors.is_empty() {
            return;
        }

        let mut map = self.window_errors.lock();
        for err in errors {
            *map.entry(err.key()).or_insert(0) += 1;
        }
    }

    /// Exactly once per completed logical operation, whatever its outcome.
    pub fn done(&self) {
        self.curr_done.fetch_add(1, Ordering::Relaxed);
    }

    /// Additionally, once per operation whose terminal outcome is a failure.
    pub fn fail(&self) {
        self.curr_fail.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain the current window into the cumulative totals, returning both
    /// the window and the post-fold totals.
    ///
    /// The scalar swaps and the error-map swap are two independent atomic
    /// sections; increments landing between them attach to the next window's
    /// map. The window/map correspondence is therefore approximate under
    /// dense concurrent writes crossing the boundary, while no increment is
    /// ever lost or observed by two windows.
    pub fn roll_up(&self) -> (WindowStats, WindowStats) {
        let done = self.curr_done.swap(0, Ordering::Relaxed);
        let attempts = self.curr_attempts.swap(0, Ordering::Relaxed);
        let fails = self.curr_fail.swap(0, Ordering::Relaxed);

        let errors = std::mem::take(&mut *self.window_errors.lock());

        let mut totals = self.totals.lock();
        totals.done += done;
        totals.attempts += attempts;
        totals.fails += fails;
        for (key, count) in &errors {
            *totals.errors.entry(key.clone()).or_insert(0) += count;
        }

        let window = WindowStats {
            done,
            attempts,
            fails,
            errors,
        };
        (window, totals.clone())
    }

    /// Cumulative counters folded so far. Does not drain the current window.
    #[must_use]
    pub fn totals(&self) -> WindowStats {
        self.totals.lock().clone()
    }

    /// Launch the periodic rollup cycle. Exactly one cycle may exist per
    /// reporter; the task exits when `stop` fires.
    pub fn start_reporting(
        self: &Arc<Self>,
        interval: Duration,
        stop: Arc<StopSignal>,
    ) -> JoinHandle<()> {
        let reporter = Arc::clone(self);
        tokio::spawn(async move {
            let seconds = interval.as_secs();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip the zero-length window.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = stop.wait() => return,
                    _ = ticker.tick() => {}
                }
                if stop.is_stopped() {
                    return;
                }

                let tick = reporter
                    .tick_id
                    .fetch_add(1, Ordering::Relaxed)
                    .saturating_add(1);
                let ctx = OpContext::background().child(format!("{tick}-Report"));
                let (window, totals) = reporter.roll_up();

                reporter.log.op_line(
                    &ctx,
                    &format!("Last {seconds} seconds - {}", render_stats_line(&window)),
                );
                reporter.log.op_line(
                    &ctx,
                    &format!("     Total      - {}", render_stats_line(&totals)),
                );

                tokio::time::sleep(SETTLE_DELAY).await;
            }
        })
    }
}

fn render_stats_line(stats: &WindowStats) -> String {
    format!(
        "Response: {:>7}, Average Attempts: {}, Error Rate: {}, ErrorMap: {}",
        stats.done,
        render_ratio(stats.attempts, stats.done, 2),
        render_ratio(stats.fails, stats.done, 3),
        render_err_map(&stats.errors),
    )
}

/// A window with no completed operations renders `-` instead of a
/// meaningless NaN.
fn render_ratio(numerator: u64, done: u64, precision: usize) -> String {
    if done == 0 {
        return "-".to_string();
    }
    format!("{:.prec$}", numerator as f64 / done as f64, prec = precision)
}

fn render_err_map(errors: &AHashMap<String, u64>) -> String {
    if errors.is_empty() {
        return "No Errors".to_string();
    }

    let mut keys: Vec<&String> = errors.keys().collect();
    keys.sort();

    let mut lines = vec![String::new()];
    for key in keys {
        lines.push(format!("{}{}", dashed_pad(key), errors[key]));
    }
    indent_block(&lines.join("\n"), ERR_BLOCK_INDENT)
}

fn dashed_pad(key: &str) -> String {
    let pad = ERR_KEY_WIDTH.saturating_sub(key.len());
    format!("{key} -{}- ", "-".repeat(pad))
}

fn indent_block(s: &str, pad: usize) -> String {
    let indent = " ".repeat(pad);
    s.lines()
        .map(|line| format!("{indent}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{BufferLog, NullLog};

    fn reporter() -> Reporter {
        Reporter::new(Arc::new(NullLog))
    }

    #[test]
    fn clean_operation_counts_into_the_window() {
        let r = reporter();
        r.add_stat(Vec::new(), 1);
        r.done();

        let (window, totals) = r.roll_up();
        assert_eq!(window.attempts, 1);
        assert_eq!(window.done, 1);
        assert_eq!(window.fails, 0);
        assert!(window.errors.is_empty());
        assert_eq!(totals, window);
    }

    #[test]
    fn failed_operation_lands_in_the_error_map() {
        let r = reporter();
        r.add_stat(vec![ErrorKind::net("connection refused")], 1);
        r.fail();
        r.done();

        let (window, _) = r.roll_up();
        assert_eq!(window.fails, 1);
        assert_eq!(window.errors.get("net-connection refused"), Some(&1));
        assert_eq!(window.errors.len(), 1);
    }

    #[test]
    fn consecutive_rollups_accumulate_totals() {
        let r = reporter();

        for _ in 0..5 {
            r.add_stat(Vec::new(), 2);
            r.done();
        }
        let (window, totals) = r.roll_up();
        assert_eq!((window.done, window.attempts), (5, 10));
        assert_eq!((totals.done, totals.attempts), (5, 10));

        for _ in 0..3 {
            r.add_stat(Vec::new(), 2);
            r.done();
        }
        let (window, totals) = r.roll_up();
        assert_eq!((window.done, window.attempts), (3, 6));
        assert_eq!((totals.done, totals.attempts), (8, 16));
    }

    #[test]
    fn rollup_resets_the_window() {
        let r = reporter();
        r.add_stat(vec![ErrorKind::Loading], 3);
        r.done();
        r.fail();
        let _ = r.roll_up();

        let (window, totals) = r.roll_up();
        assert_eq!(window, WindowStats::default());
        assert_eq!(totals.done, 1);
        assert_eq!(totals.errors.get("redis-LOADING"), Some(&1));
    }

    #[test]
    fn no_updates_are_lost_across_a_concurrent_rollup() {
        const THREADS: u64 = 8;
        const OPS: u64 = 1_000;

        let r = Arc::new(reporter());

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                let r = Arc::clone(&r);
                scope.spawn(move || {
                    for i in 0..OPS {
                        let errors = if i % 10 == 0 {
                            vec![ErrorKind::net("timeout")]
                        } else {
                            Vec::new()
                        };
                        let failed = !errors.is_empty();
                        r.add_stat(errors, 1);
                        if failed {
                            r.fail();
                        }
                        r.done();
                    }
                });
            }

            // Interleave rollups with the writers; whatever they drain must
            // land in the totals.
            for _ in 0..10 {
                let _ = r.roll_up();
                std::thread::yield_now();
            }
        });

        let (_, totals) = r.roll_up();
        assert_eq!(totals.done, THREADS * OPS);
        assert_eq!(totals.attempts, THREADS * OPS);
        assert_eq!(totals.fails, THREADS * OPS / 10);
        assert_eq!(
            totals.errors.get("net-timeout"),
            Some(&(THREADS * OPS / 10))
        );
    }

    #[test]
    fn one_hundred_concurrent_operations_total_exactly_one_hundred() {
        let r = Arc::new(reporter());

        std::thread::scope(|scope| {
            for _ in 0..100 {
                let r = Arc::clone(&r);
                scope.spawn(move || {
                    r.add_stat(Vec::new(), 1);
                    r.done();
                });
            }
        });

        let (_, totals) = r.roll_up();
        assert_eq!(totals.done + totals.fails, 100);
    }

    #[test]
    fn err_map_rendering_is_idempotent() {
        let mut errors = AHashMap::new();
        errors.insert("redis-MOVED".to_string(), 3);
        errors.insert("net-timeout".to_string(), 12);
        errors.insert("redis-LOADING".to_string(), 1);

        let first = render_err_map(&errors);
        let second = render_err_map(&errors);
        assert_eq!(first, second);

        // Sorted by kind, one line each, dashed out to the count column.
        let lines: Vec<&str> = first.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].trim_start().starts_with("net-timeout -"));
        assert!(lines[1].ends_with("- 12"));
        assert!(lines[2].trim_start().starts_with("redis-LOADING -"));
        assert!(lines[3].trim_start().starts_with("redis-MOVED -"));
    }

    #[test]
    fn empty_err_map_renders_the_marker() {
        assert_eq!(render_err_map(&AHashMap::new()), "No Errors");
    }

    #[test]
    fn zero_done_window_renders_no_data_markers() {
        let line = render_stats_line(&WindowStats::default());
        let expected = format!(
            "Response: {:>7}, Average Attempts: -, Error Rate: -, ErrorMap: No Errors",
            0
        );
        assert_eq!(line, expected);
    }

    #[test]
    fn populated_window_renders_ratios() {
        let mut errors = AHashMap::new();
        errors.insert("net-timeout".to_string(), 2);
        let window = WindowStats {
            done: 4,
            attempts: 6,
            fails: 2,
            errors,
        };

        let line = render_stats_line(&window);
        let expected = format!(
            "Response: {:>7}, Average Attempts: 1.50, Error Rate: 0.500,",
            4
        );
        assert!(line.starts_with(&expected), "got: {line}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reporting_cycle_emits_window_and_total_lines() {
        let log = Arc::new(BufferLog::new());
        let r = Arc::new(Reporter::new(log.clone()));
        let stop = Arc::new(StopSignal::new());

        r.add_stat(Vec::new(), 1);
        r.done();

        let handle = r.start_reporting(Duration::from_millis(20), stop.clone());
        tokio::time::sleep(Duration::from_millis(80)).await;
        stop.stop();
        let _ = handle.await;

        let lines = log.lines();
        assert!(
            lines.iter().any(|l| l.contains("Last 0 seconds")),
            "no window line in {lines:?}"
        );
        assert!(
            lines.iter().any(|l| l.contains("     Total      -")),
            "no total line in {lines:?}"
        );
        assert!(lines.iter().any(|l| l.contains("1-Report")));
    }
}
