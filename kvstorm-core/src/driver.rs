use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng as _;
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use kvstorm_metrics::{LatencyRecorder, LogSink, MetricsSink, OpContext, Reporter, StopSignal};

use crate::store::{Store, StoreCall};

/// Request counter, tagged by command and outcome.
pub const REQUEST_METRIC: &str = "kvstorm.op.request";
/// Dispatch-to-completion latency.
pub const ELAPSED_METRIC: &str = "kvstorm.op.elapsed";
/// Outstanding dispatch tasks.
pub const INFLIGHT_METRIC: &str = "kvstorm.tasks.inflight";

/// Cadence of the in-flight gauge.
const GAUGE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub workers: u32,
    /// Keys are drawn uniformly from `1..=key_space`.
    pub key_space: u32,
    /// Per-tick worker pause bounds (inclusive).
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Hard cap on concurrently in-flight dispatch tasks.
    pub max_in_flight: usize,
    /// TTL applied to written values.
    pub value_ttl: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workers: 500,
            key_space: 10_000,
            // ~5 ops/s per worker on average, 10 at the fast edge.
            jitter_min: Duration::from_millis(100),
            jitter_max: Duration::from_millis(299),
            max_in_flight: 4_096,
            value_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Telemetry handles threaded through every worker and dispatch task.
#[derive(Clone)]
pub struct DriverContext {
    pub reporter: Arc<Reporter>,
    pub metrics: Arc<MetricsSink>,
    pub latency: Arc<LatencyRecorder>,
    pub log: Arc<dyn LogSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Get,
    Set,
}

impl OpKind {
    fn cmd_tag(self) -> &'static str {
        match self {
            Self::Get => "cmd:get",
            Self::Set => "cmd:set",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Get => "Get",
            Self::Set => "Set",
        }
    }
}

/// Spawn the worker pool and drive it until `stop` fires.
///
/// Workers never synchronize with each other; each owns a seeded RNG and
/// paces itself with a jittered sleep. Operations run on their own dispatch
/// tasks, bounded by the shared in-flight semaphore, so operation latency
/// does not throttle the issue rate up to the cap. A failed operation is
/// counted, never retried here.
pub async fn run_workload<S: Store>(
    store: Arc<S>,
    ctx: DriverContext,
    cfg: DriverConfig,
    stop: Arc<StopSignal>,
) {
    let limiter = Arc::new(Semaphore::new(cfg.max_in_flight.max(1)));

    let gauge = tokio::spawn(inflight_gauge(
        ctx.clone(),
        limiter.clone(),
        cfg.max_in_flight.max(1),
        stop.clone(),
    ));

    let mut handles = Vec::with_capacity(cfg.workers as usize);
    for worker_id in 0..cfg.workers {
        handles.push(tokio::spawn(worker(
            worker_id,
            store.clone(),
            ctx.clone(),
            cfg.clone(),
            stop.clone(),
            limiter.clone(),
        )));
    }

    for handle in handles {
        let _ = handle.await;
    }

    gauge.abort();
    let _ = gauge.await;
}

async fn worker<S: Store>(
    id: u32,
    store: Arc<S>,
    ctx: DriverContext,
    cfg: DriverConfig,
    stop: Arc<StopSignal>,
    limiter: Arc<Semaphore>,
) {
    // Distinct deterministic seed per worker.
    let mut rng = StdRng::seed_from_u64(0x6b76_7374 ^ u64::from(id));
    let jitter_lo = cfg.jitter_min.as_millis() as u64;
    let jitter_hi = (cfg.jitter_max.as_millis() as u64).max(jitter_lo);

    while !stop.is_stopped() {
        let pause = Duration::from_millis(rng.gen_range(jitter_lo..=jitter_hi));
        tokio::select! {
            () = stop.wait() => break,
            () = tokio::time::sleep(pause) => {}
        }

        let Ok(permit) = limiter.clone().acquire_owned().await else {
            break;
        };

        let key = rng.gen_range(1..=cfg.key_space.max(1));
        let op = if rng.gen_range(0..2) == 0 {
            OpKind::Get
        } else {
            OpKind::Set
        };

        tokio::spawn(dispatch(
            store.clone(),
            ctx.clone(),
            op,
            key,
            cfg.value_ttl,
            permit,
        ));
    }
}

async fn dispatch<S: Store>(
    store: Arc<S>,
    ctx: DriverContext,
    op: OpKind,
    key: u32,
    ttl: Duration,
    permit: OwnedSemaphorePermit,
) {
    let key = key.to_string();
    let started = Instant::now();
    let op_ctx = OpContext::background().child(format!("{}-{key}", op.label()));

    let (result, stat) = match op {
        OpKind::Get => {
            let StoreCall { result, stat } = store.get(&key).await;
            // A missing key is a successful read of nothing.
            (result.map(|_| ()), stat)
        }
        OpKind::Set => {
            let StoreCall { result, stat } = store.set(&key, &key, ttl).await;
            (result, stat)
        }
    };

    ctx.reporter.add_stat(stat.error_kinds(), stat.attempts);
    ctx.latency.record(started.elapsed());

    match result {
        Ok(()) => {
            let tags = vec![op.cmd_tag().to_string(), "type:success".to_string()];
            ctx.metrics.incr(&op_ctx, REQUEST_METRIC, tags.clone());
            ctx.metrics.histogram(&op_ctx, ELAPSED_METRIC, started, tags);
        }
        Err(err) => {
            let tags = vec![
                op.cmd_tag().to_string(),
                "type:failed".to_string(),
                format!("reason:{}", err.classify()),
            ];
            ctx.metrics.incr(&op_ctx, REQUEST_METRIC, tags.clone());
            ctx.metrics.histogram(&op_ctx, ELAPSED_METRIC, started, tags);
            ctx.reporter.fail();
        }
    }
    ctx.reporter.done();

    drop(permit);
}

/// Seed the key space with one batched write so reads have data to hit.
pub async fn populate<S: Store>(store: &S, ctx: &DriverContext, key_count: u32, ttl: Duration) {
    let op_ctx = OpContext::background().child("Populate");

    let pairs: Vec<(String, String)> = (1..=key_count)
        .map(|id| (id.to_string(), id.to_string()))
        .collect();

    match store.set_many(&pairs, ttl).await {
        Ok(outcome) => ctx.log.op_line(
            &op_ctx,
            &format!(
                "Written {} of {key_count} key value pairs into the store",
                outcome.written
            ),
        ),
        Err(err) => ctx
            .log
            .op_line(&op_ctx, &format!("populate failed: {err}")),
    }
}

/// Shutdown cleanup: clear everything the run wrote.
pub async fn drain<S: Store>(store: &S, ctx: &DriverContext) {
    let op_ctx = OpContext::background().child("CleanUp");

    match store.clear().await {
        Ok(()) => ctx.log.op_line(&op_ctx, "Store flush completed"),
        Err(err) => ctx
            .log
            .op_line(&op_ctx, &format!("store flush failed: {err}")),
    }
}

/// Periodically gauge the number of outstanding dispatch permits.
async fn inflight_gauge(
    ctx: DriverContext,
    limiter: Arc<Semaphore>,
    cap: usize,
    stop: Arc<StopSignal>,
) {
    let op_ctx = OpContext::background();
    loop {
        tokio::select! {
            () = stop.wait() => return,
            () = tokio::time::sleep(GAUGE_INTERVAL) => {}
        }

        let in_flight = cap.saturating_sub(limiter.available_permits());
        ctx.metrics
            .gauge(&op_ctx, INFLIGHT_METRIC, in_flight as f64, Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_kind_tags_and_labels() {
        assert_eq!(OpKind::Get.cmd_tag(), "cmd:get");
        assert_eq!(OpKind::Set.cmd_tag(), "cmd:set");
        assert_eq!(OpKind::Get.label(), "Get");
        assert_eq!(OpKind::Set.label(), "Set");
    }

    #[test]
    fn default_config_matches_the_documented_tunables() {
        let cfg = DriverConfig::default();
        assert_eq!(cfg.workers, 500);
        assert_eq!(cfg.key_space, 10_000);
        assert!(cfg.jitter_min <= cfg.jitter_max);
    }
}
