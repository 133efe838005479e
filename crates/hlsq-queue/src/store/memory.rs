//! In-process store.
//!
//! Mirrors the Redis semantics the queue relies on (TTL expiry, atomic pop,
//! set-if-absent, compare-and-swap) behind one mutex. Expiry uses the tokio
//! clock so tests can drive it with `tokio::time::pause`/`advance`.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::KvStore;
use crate::error::QueueResult;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    lists: HashMap<String, VecDeque<String>>,
}

impl State {
    fn live(&mut self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|e| !e.is_live(now)) {
            self.values.remove(key);
        }
        self.values.get(key)
    }
}

/// In-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pushed: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn compare_and_swap(&self, key: &str, expected: &str, value: &str) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        if state.live(key).map(|e| e.value.as_str()) != Some(expected) {
            return Ok(false);
        }
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> QueueResult<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state.live(key).map(|e| e.value.clone()))
    }

    async fn exists(&self, key: &str) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state.live(key).is_some() || state.lists.get(key).is_some_and(|l| !l.is_empty()))
    }

    async fn delete(&self, key: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state.values.remove(key);
        state.lists.remove(key);
        Ok(())
    }

    async fn push(&self, list_key: &str, value: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(list_key.to_string())
            .or_default()
            .push_back(value.to_string());
        drop(state);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(&self, list_key: &str) -> QueueResult<String> {
        loop {
            // Register before checking so a push between check and await is not lost.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(value) = state.lists.get_mut(list_key).and_then(|l| l.pop_front()) {
                    return Ok(value);
                }
            }

            notified.await;
        }
    }

    async fn pop_timeout(&self, list_key: &str, timeout: Duration) -> QueueResult<Option<String>> {
        // The pop and the return happen in one poll, so timing out never drops an element.
        match tokio::time::timeout(timeout, self.blocking_pop(list_key)).await {
            Ok(value) => value.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn list(&self, list_key: &str) -> QueueResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .lists
            .get(list_key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan(&self, prefix: &str) -> QueueResult<Vec<String>> {
        let state = self.state.lock().await;
        let now = Instant::now();
        let mut keys: Vec<String> = state
            .values
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
            .map(|(k, _)| k.clone())
            .chain(
                state
                    .lists
                    .iter()
                    .filter(|(k, l)| k.starts_with(prefix) && !l.is_empty())
                    .map(|(k, _)| k.clone()),
            )
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(Duration::from_secs(5))).await.unwrap();
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.scan("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_if_absent_and_cas() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a").await.unwrap());
        assert!(!store.set_if_absent("k", "b").await.unwrap());

        assert!(!store.compare_and_swap("k", "b", "c").await.unwrap());
        assert!(store.compare_and_swap("k", "a", "c").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("c"));
        assert!(!store.compare_and_swap("missing", "a", "c").await.unwrap());
    }

    #[tokio::test]
    async fn test_blocking_pop_waits_for_push() {
        let store = Arc::new(MemoryStore::new());
        let popper = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.blocking_pop("list").await.unwrap() })
        };

        tokio::task::yield_now().await;
        assert!(!popper.is_finished());

        store.push("list", "a").await.unwrap();
        assert_eq!(popper.await.unwrap(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_timeout() {
        let store = MemoryStore::new();
        assert_eq!(store.pop_timeout("list", Duration::from_secs(1)).await.unwrap(), None);

        store.push("list", "a").await.unwrap();
        assert_eq!(
            store.pop_timeout("list", Duration::from_secs(1)).await.unwrap().as_deref(),
            Some("a")
        );
    }

    #[tokio::test]
    async fn test_each_element_popped_once() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..20 {
            store.push("list", &i.to_string()).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                for _ in 0..5 {
                    got.push(store.blocking_pop("list").await.unwrap());
                }
                got
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort_by_key(|v| v.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(all, expected);
    }
}
