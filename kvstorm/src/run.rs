use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use kvstorm_core::driver::{self, DriverConfig, DriverContext};
use kvstorm_core::store::Store;
use kvstorm_core::store::memory::MemoryStore;
use kvstorm_core::store::redis::{RedisConfig, RedisStore};
use kvstorm_metrics::{
    LatencyRecorder, LogSink, MetricsSink, Reporter, StatsdConfig, StopSignal, TeeLog,
};

use crate::cli::{RunArgs, StoreKind};
use crate::output;

/// TTL applied to every written value, populate included.
const VALUE_TTL: Duration = Duration::from_secs(60 * 60);

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let log_path = args
        .log_file
        .clone()
        .unwrap_or_else(|| default_log_path(&args));
    let log: Arc<dyn LogSink> = Arc::new(
        TeeLog::create(&log_path)
            .with_context(|| format!("failed to create log file: {}", log_path.display()))?,
    );

    let statsd = StatsdConfig {
        addr: args.statsd,
        base_tags: vec!["app:kvstorm".to_string(), format!("host:{}", args.host)],
        ..StatsdConfig::default()
    };
    let (metrics, metrics_task) = MetricsSink::spawn(statsd, log.clone());

    let ctx = DriverContext {
        reporter: Arc::new(Reporter::new(log.clone())),
        metrics,
        latency: Arc::new(LatencyRecorder::new()),
        log: log.clone(),
    };

    log.header_line(
        "kvstorm",
        &format!(
            "Addr: {}:{}, PoolSize: {}, WorkerSize: {}",
            args.host, args.port, args.pool_size, args.workers
        ),
    );

    let stop = Arc::new(StopSignal::new());
    let report_task = ctx
        .reporter
        .start_reporting(args.report_interval, stop.clone());

    match args.store {
        StoreKind::Redis => {
            let store = Arc::new(
                RedisStore::connect(&RedisConfig {
                    host: args.host.clone(),
                    port: args.port,
                    pool_size: args.pool_size,
                    ..RedisConfig::default()
                })
                .await
                .context("failed to connect to the store")?,
            );
            drive(store, &ctx, &args, stop.clone()).await;
        }
        StoreKind::Memory => {
            let store = Arc::new(MemoryStore::new());
            drive(store, &ctx, &args, stop.clone()).await;
        }
    }

    // Fold whatever the tail window accumulated before summarizing.
    let _ = ctx.reporter.roll_up();
    report_task.abort();
    let _ = report_task.await;
    metrics_task.abort();
    let _ = metrics_task.await;

    let summary = output::RunSummary::new(
        ctx.reporter.totals(),
        &ctx.latency.summarize(),
        ctx.metrics.dropped(),
    );
    output::print_summary(args.output, &summary)
}

async fn drive<S: Store>(store: Arc<S>, ctx: &DriverContext, args: &RunArgs, stop: Arc<StopSignal>) {
    driver::populate(store.as_ref(), ctx, args.key_space, VALUE_TTL).await;

    let cfg = DriverConfig {
        workers: args.workers,
        key_space: args.key_space,
        max_in_flight: args.max_in_flight,
        value_ttl: VALUE_TTL,
        ..DriverConfig::default()
    };

    let workload = tokio::spawn(driver::run_workload(
        store.clone(),
        ctx.clone(),
        cfg,
        stop.clone(),
    ));

    wait_for_shutdown(args.duration).await;
    stop.stop();
    let _ = workload.await;

    driver::drain(store.as_ref(), ctx).await;
}

async fn wait_for_shutdown(duration: Option<Duration>) {
    match duration {
        Some(d) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                () = tokio::time::sleep(d) => {}
            }
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

fn default_log_path(args: &RunArgs) -> PathBuf {
    PathBuf::from(format!(
        "kvstorm-{}-w{}-p{}.log",
        args.host, args.workers, args.pool_size
    ))
}
