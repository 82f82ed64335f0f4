use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::{BatchOutcome, CallStat, Result, Store, StoreCall, StoreError};

/// In-memory store backing `--store memory` smoke runs and the integration
/// tests. TTLs are honored lazily on read.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, Entry>>,
    fault: Mutex<Option<StoreError>>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `err` until the fault is
    /// cleared. Lets tests exercise the failure-classification path without
    /// a real broken server.
    pub fn inject_fault(&self, err: StoreError) {
        *self.fault.lock() = Some(err);
    }

    pub fn clear_fault(&self) {
        *self.fault.lock() = None;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    fn current_fault(&self) -> Option<StoreError> {
        self.fault.lock().clone()
    }
}

impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreCall<Option<String>> {
        let mut stat = CallStat {
            attempts: 1,
            errors: Vec::new(),
        };

        if let Some(err) = self.current_fault() {
            stat.errors.push(err.clone());
            return StoreCall {
                result: Err(err),
                stat,
            };
        }

        let value = {
            let map = self.map.read();
            map.get(key)
                .and_then(|entry| (entry.expires_at > Instant::now()).then(|| entry.value.clone()))
        };

        StoreCall {
            result: Ok(value),
            stat,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreCall<()> {
        let mut stat = CallStat {
            attempts: 1,
            errors: Vec::new(),
        };

        if let Some(err) = self.current_fault() {
            stat.errors.push(err.clone());
            return StoreCall {
                result: Err(err),
                stat,
            };
        }

        self.map.write().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );

        StoreCall {
            result: Ok(()),
            stat,
        }
    }

    async fn set_many(&self, pairs: &[(String, String)], ttl: Duration) -> Result<BatchOutcome> {
        if let Some(err) = self.current_fault() {
            return Err(err);
        }

        let expires_at = Instant::now() + ttl;
        let mut map = self.map.write();
        for (key, value) in pairs {
            map.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }

        Ok(BatchOutcome {
            written: pairs.len() as u64,
            failed: 0,
        })
    }

    async fn clear(&self) -> Result<()> {
        if let Some(err) = self.current_fault() {
            return Err(err);
        }
        self.map.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        let set = store.set("1", "1", Duration::from_secs(60)).await;
        assert!(set.result.is_ok());
        assert_eq!(set.stat.attempts, 1);

        let get = store.get("1").await;
        assert_eq!(get.result, Ok(Some("1".to_string())));
    }

    #[tokio::test]
    async fn missing_key_is_none_not_an_error() {
        let store = MemoryStore::new();
        let get = store.get("42").await;
        assert_eq!(get.result, Ok(None));
        assert!(get.stat.errors.is_empty());
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let store = MemoryStore::new();
        let _ = store.set("k", "v", Duration::ZERO).await;

        let get = store.get("k").await;
        assert_eq!(get.result, Ok(None));
    }

    #[tokio::test]
    async fn set_many_and_clear() {
        let store = MemoryStore::new();
        let pairs: Vec<(String, String)> =
            (1..=10).map(|i: u32| (i.to_string(), i.to_string())).collect();

        let outcome = store.set_many(&pairs, Duration::from_secs(60)).await;
        assert_eq!(
            outcome,
            Ok(BatchOutcome {
                written: 10,
                failed: 0
            })
        );
        assert_eq!(store.len(), 10);

        assert_eq!(store.clear().await, Ok(()));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn injected_fault_fails_calls_until_cleared() {
        let store = MemoryStore::new();
        store.inject_fault(StoreError::net("connection refused"));

        let get = store.get("1").await;
        assert_eq!(get.result, Err(StoreError::net("connection refused")));
        assert_eq!(get.stat.errors.len(), 1);

        store.clear_fault();
        assert_eq!(store.get("1").await.result, Ok(None));
    }
}
