use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "kvstorm",
    author,
    version,
    about = "Randomized load generator for Redis-compatible key-value stores",
    long_about = "kvstorm drives a pool of workers issuing randomized GET/SET operations against a key-value store, classifies every failure into a stable error kind, and reports windowed plus cumulative statistics on a fixed interval.\n\nEvery tunable can also come from the environment (REDIS_HOST, REDIS_PORT, WORKER_SIZE, POOL_SIZE, KEY_SPACE, LOG_FILE, STATSD_ADDR).",
    after_help = "Examples:\n  kvstorm run\n  kvstorm run --host redis.internal --workers 1000 --duration 5m\n  kvstorm run --store memory --duration 30s --output json\n  WORKER_SIZE=50 kvstorm run --statsd 127.0.0.1:8125"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the workload until interrupted (or for --duration)
    Run(RunArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Redis or any RESP-compatible server
    Redis,
    /// Built-in in-memory store (smoke runs, no server required)
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable end-of-run summary.
    HumanReadable,
    /// JSON end-of-run summary on stdout.
    Json,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Store host
    #[arg(long, env = "REDIS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Store port
    #[arg(long, env = "REDIS_PORT", default_value_t = 6379)]
    pub port: u16,

    /// Number of workers issuing operations
    #[arg(long, env = "WORKER_SIZE", default_value_t = 500)]
    pub workers: u32,

    /// Connections kept to the store
    #[arg(long, env = "POOL_SIZE", default_value_t = 50)]
    pub pool_size: u32,

    /// Keys are drawn from 1..=key-space; the same range is seeded up front
    #[arg(long, env = "KEY_SPACE", default_value_t = 10_000)]
    pub key_space: u32,

    /// Log file path (default: kvstorm-<host>-w<workers>-p<pool>.log)
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// statsd/dogstatsd endpoint, e.g. 127.0.0.1:8125 (omit to disable)
    #[arg(long, env = "STATSD_ADDR")]
    pub statsd: Option<SocketAddr>,

    /// Reporting window (e.g. 10s, 1m)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub report_interval: Duration,

    /// Hard cap on concurrently in-flight operations
    #[arg(long, default_value_t = 4096)]
    pub max_in_flight: usize,

    /// Stop after this long instead of waiting for ctrl-c (e.g. 5m)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Store backend
    #[arg(long, value_enum, default_value_t = StoreKind::Redis)]
    pub store: StoreKind,

    /// Output format for the end-of-run summary
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}
