use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use edge_identity::{KeyValueStore, StoreError, StoreResult, StoreVisitor};
use papaya::HashMap as PapayaHashMap;

/// In-memory key-value store using a papaya lock-free map.
///
/// Nothing survives the process, but clones share the same map, so a second
/// cache built over a clone sees everything the first one wrote. Tests use
/// this to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<PapayaHashMap<String, String>>,
    put_count: Arc<AtomicU64>,
    failing_puts: Arc<AtomicUsize>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `put` fail without writing.
    pub fn fail_next_puts(&self, count: usize) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Number of successful `put` calls.
    #[must_use]
    pub fn put_count(&self) -> u64 {
        self.put_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes one injected failure, if any remain.
    fn take_failure(&self) -> bool {
        self.failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn put(&self, key: &str, value: String) -> StoreResult<()> {
        if self.take_failure() {
            return Err(StoreError::io(format!("injected write failure for {key}")));
        }

        self.data.pin().insert(key.to_string(), value);
        self.put_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.data.pin().get(key).cloned())
    }

    async fn iterate_all(&self, visitor: &mut StoreVisitor<'_>) -> StoreResult<()> {
        // Snapshot first so the visitor never runs under the pin guard
        let entries: Vec<(String, String)> = {
            let guard = self.data.pin();
            guard
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        for (key, value) in entries {
            visitor(key, value);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let store = InMemoryStore::new();
        assert!(store.get("d1").await.unwrap().is_none());

        store.put("d1", "one".to_string()).await.unwrap();
        store.put("d1", "two".to_string()).await.unwrap();

        assert_eq!(store.get("d1").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_iterate_all_visits_every_entry() {
        let store = InMemoryStore::new();
        for i in 0..100 {
            store.put(&format!("d{i}"), i.to_string()).await.unwrap();
        }

        let mut seen = Vec::new();
        store
            .iterate_all(&mut |k, v| seen.push((k, v)))
            .await
            .unwrap();

        assert_eq!(seen.len(), 100);
        assert!(seen.contains(&("d42".to_string(), "42".to_string())));
    }

    #[tokio::test]
    async fn test_injected_failures_leave_previous_value() {
        let store = InMemoryStore::new();
        store.put("d1", "old".to_string()).await.unwrap();

        store.fail_next_puts(1);
        assert!(store.put("d1", "new".to_string()).await.is_err());
        assert_eq!(store.get("d1").await.unwrap().as_deref(), Some("old"));

        store.put("d1", "new".to_string()).await.unwrap();
        assert_eq!(store.get("d1").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = InMemoryStore::new();
        let restarted = store.clone();
        store.put("d1", "v".to_string()).await.unwrap();
        assert_eq!(restarted.get("d1").await.unwrap().as_deref(), Some("v"));
    }
}
