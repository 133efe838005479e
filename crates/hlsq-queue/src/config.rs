//! Queue configuration.

use std::time::Duration;

use tracing::warn;

use crate::error::{QueueError, QueueResult};
use crate::keys::KeySpace;

pub const DEFAULT_KEY_PREFIX: &str = "hlsq:";

/// Which store backend to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Redis { url: String },
    /// In-process store; only useful when every component shares one process.
    Memory,
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: StoreBackend,
    /// Prefix for every key written by the queue
    pub key_prefix: String,
    /// Lifetime of a worker liveness key
    pub heartbeat_ttl: Duration,
    /// Refresh cadence of the liveness key; must be shorter than the TTL
    pub heartbeat_interval: Duration,
    /// Server-side blocking slice for one BLPOP; the dequeue itself waits forever
    pub pop_timeout: Duration,
    /// Apply the attempt cap to jobs recovered from dead workers
    pub recovery_applies_retry_cap: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis {
                url: "redis://localhost:6379".to_string(),
            },
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            heartbeat_ttl: Duration::from_secs(35),
            heartbeat_interval: Duration::from_secs(10),
            pop_timeout: Duration::from_secs(5),
            recovery_applies_retry_cap: false,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let backend = match std::env::var("QUEUE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("redis") | Err(_) => StoreBackend::Redis {
                url: std::env::var("REDIS_URL")
                    .map_err(|_| QueueError::config("REDIS_URL not set"))?,
            },
            Ok(other) => {
                return Err(QueueError::config(format!("invalid QUEUE_BACKEND: {}", other)))
            }
        };

        let config = Self {
            backend,
            key_prefix: std::env::var("QUEUE_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_KEY_PREFIX.to_string()),
            heartbeat_ttl: Duration::from_secs(
                std::env::var("HEARTBEAT_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(35),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("HEARTBEAT_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            pop_timeout: Duration::from_secs(
                std::env::var("QUEUE_POP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            recovery_applies_retry_cap: std::env::var("RECOVERY_APPLIES_RETRY_CAP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject heartbeat timings that would let a live worker look dead.
    pub fn validate(&self) -> QueueResult<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(QueueError::config("heartbeat interval must be positive"));
        }
        if self.heartbeat_interval >= self.heartbeat_ttl {
            return Err(QueueError::config(format!(
                "heartbeat interval ({:?}) must be shorter than its TTL ({:?})",
                self.heartbeat_interval, self.heartbeat_ttl
            )));
        }
        if self.heartbeat_interval * 3 > self.heartbeat_ttl {
            warn!(
                interval = ?self.heartbeat_interval,
                ttl = ?self.heartbeat_ttl,
                "Heartbeat TTL is less than 3x the refresh interval; a slow store may expire live workers"
            );
        }
        if self.pop_timeout.is_zero() {
            return Err(QueueError::config("pop timeout must be positive"));
        }
        Ok(())
    }

    pub fn keys(&self) -> KeySpace {
        KeySpace::new(self.key_prefix.clone())
    }
}
