pub mod context;
pub mod error_kind;
pub mod latency;
pub mod log;
pub mod reporter;
pub mod signal;
pub mod statsd;

pub use context::OpContext;
pub use error_kind::ErrorKind;
pub use latency::{LatencyRecorder, LatencySummary};
pub use log::{BufferLog, LogSink, NullLog, TeeLog};
pub use reporter::{Reporter, WindowStats};
pub use signal::StopSignal;
pub use statsd::{MetricEvent, MetricsSink, StatsdConfig};
