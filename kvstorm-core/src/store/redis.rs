use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use redis::AsyncCommands as _;
use redis::aio::ConnectionManager;

use super::{BatchOutcome, CallStat, Result, Store, StoreCall, StoreError};

/// How many keys one bulk-write pipeline carries.
const BATCH_CHUNK: usize = 1_000;
/// Pause between retries of a transient failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Number of multiplexed connections, served round-robin.
    pub pool_size: u32,
    /// Extra tries after the first failed attempt (transient errors only).
    pub retries: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            pool_size: 50,
            retries: 2,
        }
    }
}

/// Redis-backed [`Store`].
///
/// Keyed operations run a bounded retry loop that records one error per
/// failed attempt, mirroring what the aggregation layer wants to count.
/// `MOVED`/`ASK` and other protocol errors fail fast; only transport-level
/// and loading/try-again failures are retried.
pub struct RedisStore {
    connections: Vec<ConnectionManager>,
    next: AtomicUsize,
    retries: u32,
}

impl RedisStore {
    /// Connect the whole pool up front. Any failure here is startup-fatal
    /// for the caller.
    pub async fn connect(cfg: &RedisConfig) -> Result<Self> {
        let url = format!("redis://{}:{}/", cfg.host, cfg.port);
        let client = redis::Client::open(url).map_err(|err| store_error(&err))?;

        let pool_size = cfg.pool_size.max(1) as usize;
        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = ConnectionManager::new(client.clone())
                .await
                .map_err(|err| store_error(&err))?;
            connections.push(conn);
        }

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            retries: cfg.retries,
        })
    }

    fn connection(&self) -> ConnectionManager {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx].clone()
    }
}

impl Store for RedisStore {
    async fn get(&self, key: &str) -> StoreCall<Option<String>> {
        let mut stat = CallStat::default();
        loop {
            stat.attempts += 1;
            let mut conn = self.connection();
            match conn.get::<_, Option<String>>(key).await {
                Ok(value) => {
                    return StoreCall {
                        result: Ok(value),
                        stat,
                    };
                }
                Err(err) => {
                    let mapped = store_error(&err);
                    stat.errors.push(mapped.clone());
                    if stat.attempts > u64::from(self.retries) || !retryable(&err) {
                        return StoreCall {
                            result: Err(mapped),
                            stat,
                        };
                    }
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreCall<()> {
        let secs = ttl.as_secs().max(1);
        let mut stat = CallStat::default();
        loop {
            stat.attempts += 1;
            let mut conn = self.connection();
            let outcome = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(secs)
                .query_async::<_, ()>(&mut conn)
                .await;
            match outcome {
                Ok(()) => {
                    return StoreCall {
                        result: Ok(()),
                        stat,
                    };
                }
                Err(err) => {
                    let mapped = store_error(&err);
                    stat.errors.push(mapped.clone());
                    if stat.attempts > u64::from(self.retries) || !retryable(&err) {
                        return StoreCall {
                            result: Err(mapped),
                            stat,
                        };
                    }
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    async fn set_many(&self, pairs: &[(String, String)], ttl: Duration) -> Result<BatchOutcome> {
        let secs = ttl.as_secs().max(1);
        let mut outcome = BatchOutcome::default();
        let mut first_err: Option<StoreError> = None;

        for chunk in pairs.chunks(BATCH_CHUNK) {
            let mut pipe = redis::pipe();
            for (key, value) in chunk {
                pipe.cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(secs)
                    .ignore();
            }

            let mut conn = self.connection();
            match pipe.query_async::<_, ()>(&mut conn).await {
                Ok(()) => outcome.written += chunk.len() as u64,
                Err(err) => {
                    outcome.failed += chunk.len() as u64;
                    if first_err.is_none() {
                        first_err = Some(store_error(&err));
                    }
                }
            }
        }

        if outcome.written == 0
            && let Some(err) = first_err
        {
            return Err(err);
        }
        Ok(outcome)
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.connection();
        redis::cmd("FLUSHALL")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|err| store_error(&err))
    }
}

/// Map a client error onto the store taxonomy. Protocol errors are rebuilt
/// into `CODE detail` form so the aggregation layer's prefix rules fire.
fn store_error(err: &redis::RedisError) -> StoreError {
    use redis::ErrorKind as Kind;

    if err.is_io_error() || err.is_timeout() {
        let cause = err
            .detail()
            .map_or_else(|| err.category().to_string(), str::to_string);
        return StoreError::net(cause);
    }

    let detail = err.detail().unwrap_or_default();
    match err.kind() {
        Kind::BusyLoadingError => StoreError::proto(join_code("LOADING", detail)),
        Kind::Moved => StoreError::proto(join_code("MOVED", detail)),
        Kind::Ask => StoreError::proto(join_code("ASK", detail)),
        _ if detail.is_empty() => StoreError::proto(err.category().to_string()),
        _ => StoreError::proto(detail.to_string()),
    }
}

fn join_code(code: &str, detail: &str) -> String {
    if detail.is_empty() {
        code.to_string()
    } else {
        format!("{code} {detail}")
    }
}

fn retryable(err: &redis::RedisError) -> bool {
    err.is_io_error()
        || err.is_timeout()
        || matches!(
            err.kind(),
            redis::ErrorKind::BusyLoadingError | redis::ErrorKind::TryAgain
        )
}
