//! Redis-backed store.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info};

use super::KvStore;
use crate::error::QueueResult;

/// GET-compare-SET in one round trip.
const COMPARE_AND_SWAP: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// Redis store client.
pub struct RedisStore {
    client: redis::Client,
    pop_timeout: Duration,
    cas_script: redis::Script,
}

impl RedisStore {
    /// Create a client; no connection is made until the first command.
    pub fn new(redis_url: &str, pop_timeout: Duration) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            pop_timeout,
            cas_script: redis::Script::new(COMPARE_AND_SWAP),
        })
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        cmd.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_swap(&self, key: &str, expected: &str, value: &str) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let swapped: i32 = self
            .cas_script
            .key(key)
            .arg(expected)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn get(&self, key: &str) -> QueueResult<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn exists(&self, key: &str) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn push(&self, list_key: &str, value: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.rpush::<_, _, ()>(list_key, value).await?;
        Ok(())
    }

    async fn blocking_pop(&self, list_key: &str) -> QueueResult<String> {
        // Own connection: a blocked BLPOP would stall other multiplexed callers.
        let mut conn = self.conn().await?;
        let slice = self.pop_timeout.as_secs().max(1);
        loop {
            let reply: Option<(String, String)> = redis::cmd("BLPOP")
                .arg(list_key)
                .arg(slice)
                .query_async(&mut conn)
                .await?;
            if let Some((_, value)) = reply {
                return Ok(value);
            }
        }
    }

    async fn pop_timeout(&self, list_key: &str, timeout: Duration) -> QueueResult<Option<String>> {
        let mut conn = self.conn().await?;
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        let reply: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(list_key)
            .arg(secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn list(&self, list_key: &str) -> QueueResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let values: Vec<String> = conn.lrange(list_key, 0, -1).await?;
        Ok(values)
    }

    async fn scan(&self, prefix: &str) -> QueueResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        debug!("Scanned {} keys under {}", keys.len(), prefix);
        Ok(keys)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        info!("Connected to Redis");
        Ok(())
    }
}
