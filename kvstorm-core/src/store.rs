use std::future::Future;
use std::time::Duration;

use kvstorm_metrics::ErrorKind;

pub mod memory;
pub mod redis;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure of a single store operation, split along the taxonomy the
/// aggregation layer cares about. A missing key is not an error (reads
/// return `Ok(None)`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Transport-level failure (connect, timeout, DNS).
    #[error("net error: {cause}")]
    Net { cause: String },

    /// Protocol-level error returned by the store, in `CODE detail` form.
    #[error("store error: {message}")]
    Proto { message: String },

    /// Anything outside the transport/protocol split.
    #[error("{message}")]
    Other { message: String },
}

impl StoreError {
    #[must_use]
    pub fn net(cause: impl Into<String>) -> Self {
        Self::Net {
            cause: cause.into(),
        }
    }

    #[must_use]
    pub fn proto(message: impl Into<String>) -> Self {
        Self::Proto {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Total classification into the aggregation vocabulary.
    #[must_use]
    pub fn classify(&self) -> ErrorKind {
        match self {
            Self::Net { cause } => ErrorKind::net(cause.clone()),
            Self::Proto { message } => ErrorKind::from_proto_message(message),
            Self::Other { message } => ErrorKind::other(message.clone()),
        }
    }
}

/// Attempt accounting for one store call: how many tries the client made
/// and the error observed on each failed try.
#[derive(Debug, Clone, Default)]
pub struct CallStat {
    pub attempts: u64,
    pub errors: Vec<StoreError>,
}

impl CallStat {
    /// Classify every per-attempt error.
    #[must_use]
    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.errors.iter().map(StoreError::classify).collect()
    }
}

/// Result-plus-stat pair returned by every keyed store call.
#[derive(Debug)]
pub struct StoreCall<T> {
    pub result: Result<T>,
    pub stat: CallStat,
}

/// Outcome of a bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub written: u64,
    pub failed: u64,
}

/// The key-value store capability the workload drives.
pub trait Store: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = StoreCall<Option<String>>> + Send;

    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = StoreCall<()>> + Send;

    /// Bulk write. Chunked implementations report partial success.
    fn set_many(
        &self,
        pairs: &[(String, String)],
        ttl: Duration,
    ) -> impl Future<Output = Result<BatchOutcome>> + Send;

    /// Bulk clear, used for shutdown cleanup.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}
