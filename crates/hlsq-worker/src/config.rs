//! Worker settings, read from the environment.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use hlsq_media::TranscoderConfig;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Scratch directory; uploads land in `{work_dir}/{id}/input`
    pub work_dir: PathBuf,
    /// How long an in-flight job may run on after a shutdown signal
    pub shutdown_timeout: Duration,
    /// Pause after a failed store operation in the processing loop (zero disables)
    pub store_error_backoff: Duration,
    /// FFmpeg `-hwaccel` value
    pub hwaccel: Option<String>,
    /// Kill any single FFmpeg run after this long
    pub ffmpeg_timeout: Option<Duration>,
    /// Serve Prometheus metrics on this address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("data/tmp"),
            shutdown_timeout: Duration::from_secs(60),
            store_error_backoff: Duration::from_millis(1000),
            hwaccel: None,
            ffmpeg_timeout: None,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: env::var_os("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            shutdown_timeout: parsed("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            store_error_backoff: parsed("WORKER_STORE_ERROR_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_error_backoff),
            // "none" is accepted as an explicit opt-out
            hwaccel: env::var("FFMPEG_HARDWARE_ACCEL")
                .ok()
                .filter(|accel| !accel.is_empty() && accel != "none"),
            ffmpeg_timeout: parsed("FFMPEG_TIMEOUT_SECS")
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs),
            metrics_addr: parsed("WORKER_METRICS_ADDR"),
        }
    }

    pub fn transcoder_config(&self) -> TranscoderConfig {
        TranscoderConfig {
            work_dir: self.work_dir.clone(),
            hwaccel: self.hwaccel.clone(),
            ffmpeg_timeout_secs: self.ffmpeg_timeout.map(|t| t.as_secs()),
        }
    }
}

fn parsed<T: FromStr>(var: &str) -> Option<T> {
    env::var(var).ok()?.parse().ok()
}
