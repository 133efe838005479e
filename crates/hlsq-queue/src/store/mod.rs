//! Key/value + list store abstraction.
//!
//! Every queue component talks to the shared backend through [`KvStore`], so
//! the Redis client can be swapped for [`MemoryStore`] in tests.

mod memory;
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{QueueConfig, StoreBackend};
use crate::error::QueueResult;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Operations the queue needs from the shared store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> QueueResult<()>;

    /// Set a value only if the key does not exist. Returns true when written.
    async fn set_if_absent(&self, key: &str, value: &str) -> QueueResult<bool>;

    /// Replace `expected` with `value` atomically. Returns false when the
    /// current value differs (or the key is gone).
    async fn compare_and_swap(&self, key: &str, expected: &str, value: &str) -> QueueResult<bool>;

    async fn get(&self, key: &str) -> QueueResult<Option<String>>;

    async fn exists(&self, key: &str) -> QueueResult<bool>;

    async fn delete(&self, key: &str) -> QueueResult<()>;

    /// Append to the tail of a list.
    async fn push(&self, list_key: &str, value: &str) -> QueueResult<()>;

    /// Pop from the head of a list, waiting until an element is available.
    async fn blocking_pop(&self, list_key: &str) -> QueueResult<String>;

    /// Pop from the head of a list, waiting at most about `timeout`.
    ///
    /// Safe to call in a loop that checks for shutdown between calls; an
    /// element is never lost to an abandoned wait.
    async fn pop_timeout(&self, list_key: &str, timeout: Duration) -> QueueResult<Option<String>>;

    /// All list elements, head first.
    async fn list(&self, list_key: &str) -> QueueResult<Vec<String>>;

    /// Keys starting with `prefix`, in no particular order.
    async fn scan(&self, prefix: &str) -> QueueResult<Vec<String>>;

    /// Round-trip check used at startup.
    async fn ping(&self) -> QueueResult<()>;
}

/// Connect to the configured backend and verify it answers.
pub async fn connect(config: &QueueConfig) -> QueueResult<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match &config.backend {
        StoreBackend::Redis { url } => Arc::new(RedisStore::new(url, config.pop_timeout)?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    store.ping().await?;
    Ok(store)
}
