use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_BODY: usize = 1 << 30;
const DEFAULT_WORK_DIR: &str = "data/tmp";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret expected in the `x-api-key` header
    pub api_key: String,
    /// Largest accepted request body, which bounds uploads
    pub max_body_size: usize,
    /// Uploads land in `{work_dir}/{id}/input`; workers must see the same path
    pub work_dir: PathBuf,
    /// Recovery sweep cadence, `None` when disabled
    pub recovery_interval: Option<Duration>,
    /// Finished-job collection cadence, `None` when disabled
    pub gc_interval: Option<Duration>,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            api_key: String::new(),
            max_body_size: DEFAULT_MAX_BODY,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            recovery_interval: None,
            gc_interval: None,
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Read the server settings. Only `API_KEY` is mandatory.
    pub fn from_env() -> ApiResult<Self> {
        let Some(api_key) = env::var("API_KEY").ok().filter(|k| !k.is_empty()) else {
            return Err(ApiError::config("API_KEY not set"));
        };
        let defaults = Self::default();

        Ok(Self {
            host: env::var("API_HOST").unwrap_or(defaults.host),
            port: parsed("API_PORT").unwrap_or(defaults.port),
            api_key,
            max_body_size: parsed("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            work_dir: env::var_os("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            recovery_interval: interval("RECOVERY_INTERVAL_SECS"),
            gc_interval: interval("GC_INTERVAL_SECS"),
            metrics_enabled: env::var("METRICS_ENABLED")
                .map(|v| matches!(v.as_str(), "true" | "1"))
                .unwrap_or(defaults.metrics_enabled),
        })
    }
}

fn parsed<T: FromStr>(var: &str) -> Option<T> {
    env::var(var).ok()?.parse().ok()
}

/// Unset, unparsable and zero all mean disabled.
fn interval(var: &str) -> Option<Duration> {
    parsed::<u64>(var).filter(|&secs| secs > 0).map(Duration::from_secs)
}
