use std::fmt;

/// Stable, low-cardinality classification of an operation failure.
///
/// Store messages may embed keys, slots, or addresses; collapsing them into
/// a small fixed vocabulary keeps the aggregation map bounded and makes
/// dashboards meaningful. Loading and redirect signals get their own kinds
/// because they indicate transient cluster topology churn rather than true
/// failures of the workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport-level failure (connect, timeout, DNS).
    Net { cause: String },
    /// The store is loading its dataset and cannot serve yet.
    Loading,
    /// Cluster redirect: the slot has been resharded to another node.
    Moved,
    /// Cluster redirect: the key is migrating to another node.
    Ask,
    /// Any other store-protocol error.
    Proto { message: String },
    /// Failure outside the recognized categories; keeps the raw message.
    Other { message: String },
}

impl ErrorKind {
    #[must_use]
    pub fn net(cause: impl Into<String>) -> Self {
        Self::Net {
            cause: cause.into(),
        }
    }

    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Classify a store-protocol error message.
    ///
    /// Prefix matches win regardless of any suffix text (redirects embed the
    /// slot and target address after the code).
    #[must_use]
    pub fn from_proto_message(message: &str) -> Self {
        if message.starts_with("LOADING") {
            return Self::Loading;
        }
        if message.starts_with("MOVED ") {
            return Self::Moved;
        }
        if message.starts_with("ASK ") {
            return Self::Ask;
        }

        let message = message.strip_prefix("ERR ").unwrap_or(message);
        Self::Proto {
            message: message.to_string(),
        }
    }

    /// The aggregation key. Total: never empty for any input.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Net { cause } => format!("net-{cause}"),
            Self::Loading => "redis-LOADING".to_string(),
            Self::Moved => "redis-MOVED".to_string(),
            Self::Ask => "redis-ASK".to_string(),
            Self::Proto { message } => format!("redis-{message}"),
            Self::Other { message } if message.is_empty() => "unknown".to_string(),
            Self::Other { message } => message.clone(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
