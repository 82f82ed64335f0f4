use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::context::OpContext;
use crate::log::LogSink;

/// A single queued metric emission. Carries the originating request context
/// so delivery failures can be attributed in the debug log.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    Incr {
        ctx: OpContext,
        name: &'static str,
        tags: Vec<String>,
    },
    Gauge {
        ctx: OpContext,
        name: &'static str,
        value: f64,
        tags: Vec<String>,
    },
    Histogram {
        ctx: OpContext,
        name: &'static str,
        millis: f64,
        tags: Vec<String>,
    },
}

impl MetricEvent {
    fn ctx(&self) -> &OpContext {
        match self {
            Self::Incr { ctx, .. } | Self::Gauge { ctx, .. } | Self::Histogram { ctx, .. } => ctx,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Incr { name, .. } | Self::Gauge { name, .. } | Self::Histogram { name, .. } => {
                name
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsdConfig {
    /// Backend endpoint. `None` drains and discards (metrics disabled).
    pub addr: Option<SocketAddr>,
    /// Constant tags prepended to every event.
    pub base_tags: Vec<String>,
    /// Outbound queue bound; producers drop (and count) past this.
    pub queue: usize,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            addr: None,
            base_tags: Vec::new(),
            queue: 1_024,
        }
    }
}

/// Best-effort statsd client: a bounded queue drained by one consumer task.
///
/// Producers never block. When the queue is full the event is dropped and
/// counted. Send failures are logged through the log sink, never returned to
/// callers.
pub struct MetricsSink {
    tx: mpsc::Sender<MetricEvent>,
    dropped: AtomicU64,
}

impl MetricsSink {
    pub fn spawn(cfg: StatsdConfig, log: Arc<dyn LogSink>) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(cfg.queue.max(1));
        let sink = Arc::new(Self {
            tx,
            dropped: AtomicU64::new(0),
        });
        let task = tokio::spawn(consume(cfg, rx, log));
        (sink, task)
    }

    pub fn incr(&self, ctx: &OpContext, name: &'static str, tags: Vec<String>) {
        self.enqueue(MetricEvent::Incr {
            ctx: ctx.clone(),
            name,
            tags,
        });
    }

    pub fn gauge(&self, ctx: &OpContext, name: &'static str, value: f64, tags: Vec<String>) {
        self.enqueue(MetricEvent::Gauge {
            ctx: ctx.clone(),
            name,
            value,
            tags,
        });
    }

    /// Histogram sample measured from `start` to now, in milliseconds.
    pub fn histogram(&self, ctx: &OpContext, name: &'static str, start: Instant, tags: Vec<String>) {
        self.enqueue(MetricEvent::Histogram {
            ctx: ctx.clone(),
            name,
            millis: start.elapsed().as_secs_f64() * 1e3,
            tags,
        });
    }

    /// Events discarded because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, event: MetricEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

async fn consume(cfg: StatsdConfig, mut rx: mpsc::Receiver<MetricEvent>, log: Arc<dyn LogSink>) {
    let socket = match cfg.addr {
        Some(addr) => match bind(addr).await {
            Ok(socket) => Some(socket),
            Err(err) => {
                log.header_line(
                    "metrics",
                    &format!("statsd socket unavailable, discarding events: {err}"),
                );
                None
            }
        },
        None => None,
    };

    while let Some(event) = rx.recv().await {
        let Some(socket) = &socket else { continue };

        let line = format_event(&event, &cfg.base_tags);
        if let Err(err) = socket.send(line.as_bytes()).await {
            log.op_line(
                event.ctx(),
                &format!(
                    "metric: {}, unexpected error {err} during send",
                    event.name()
                ),
            );
        }
    }
}

async fn bind(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let local = if addr.is_ipv4() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

fn format_event(event: &MetricEvent, base_tags: &[String]) -> String {
    let (name, value, tags) = match event {
        MetricEvent::Incr { name, tags, .. } => (*name, "1|c".to_string(), tags),
        MetricEvent::Gauge {
            name, value, tags, ..
        } => (*name, format!("{value}|g"), tags),
        MetricEvent::Histogram {
            name, millis, tags, ..
        } => (*name, format!("{millis:.3}|h"), tags),
    };

    let mut line = format!("{name}:{value}");
    let mut all = base_tags.iter().chain(tags.iter());
    if let Some(first) = all.next() {
        line.push_str("|#");
        line.push_str(first);
        for tag in all {
            line.push(',');
            line.push_str(tag);
        }
    }
    line
}
