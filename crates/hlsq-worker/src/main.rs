//! Worker process: claims jobs from the queue and runs them through FFmpeg.

use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hlsq_media::{check_ffmpeg, HlsTranscoder};
use hlsq_queue::JobQueue;
use hlsq_storage::StorageConfig;
use hlsq_worker::{JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Fails only when a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting hlsq-worker");

    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        std::process::exit(1);
    }

    info!("hlsq-worker stopped");
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hlsq=info,info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    // Exactly one of the two formatters is active
    let (json_layer, text_layer) = if json {
        (Some(fmt::layer().json().with_current_span(true)), None)
    } else {
        (None, Some(fmt::layer().with_target(true).with_thread_ids(false)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!(?config, "Loaded worker settings");

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to start metrics exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let ffmpeg = check_ffmpeg().context("ffmpeg is required")?;
    info!("Using ffmpeg at {}", ffmpeg.display());

    let queue = JobQueue::from_env()
        .await
        .context("failed to connect to job queue")?;
    let storage_config = StorageConfig::from_env().context("invalid storage configuration")?;
    info!(mode = storage_config.mode(), "Connecting to storage");
    let storage = hlsq_storage::connect(storage_config)
        .await
        .context("failed to connect to storage")?;

    let transcoder = Arc::new(HlsTranscoder::new(storage, config.transcoder_config()));

    // The lease must be live before the first claim
    let heartbeat = queue
        .heartbeat()
        .start()
        .await
        .context("failed to start heartbeat")?;

    let shutdown_timeout = config.shutdown_timeout;
    let executor = JobExecutor::new(config, queue, transcoder, heartbeat.worker_id().clone());
    let cancel = CancellationToken::new();

    let mut task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { executor.run(cancel).await })
    };

    tokio::select! {
        result = &mut task => {
            // The loop only ends on cancellation, so this is a crash
            heartbeat.stop().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("executor stopped"),
                Err(e) => Err(e).context("executor task panicked"),
            };
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, draining");
        }
    }

    cancel.cancel();
    match tokio::time::timeout(shutdown_timeout, task).await {
        Ok(Ok(Ok(()))) => info!("Executor drained"),
        Ok(Ok(Err(e))) => error!("Executor error during shutdown: {}", e),
        Ok(Err(e)) => error!("Executor task panicked: {}", e),
        // The in-flight job keeps its lease until the heartbeat expires and
        // is then recovered by a sweep.
        Err(_) => warn!(timeout = ?shutdown_timeout, "Shutdown timeout elapsed with a job in flight"),
    }

    heartbeat.stop().await;
    Ok(())
}
