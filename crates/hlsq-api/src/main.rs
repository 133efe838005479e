//! HTTP front end: uploads, queue administration and artifact access.

use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hlsq_api::{create_router, metrics, scheduler, ApiConfig, AppState};
use hlsq_queue::JobQueue;
use hlsq_storage::StorageConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Fails only when a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing();

    info!("Starting hlsq-api");

    if let Err(e) = run().await {
        error!("API server failed: {:#}", e);
        std::process::exit(1);
    }

    info!("hlsq-api stopped");
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
    let config = ApiConfig::from_env()?;

    let queue = JobQueue::from_env()
        .await
        .context("failed to connect to job queue")?;
    let storage_config = StorageConfig::from_env().context("invalid storage configuration")?;
    info!(mode = storage_config.mode(), "Connecting to storage");
    let storage = hlsq_storage::connect(storage_config)
        .await
        .context("failed to connect to storage")?;
    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("failed to create {}", config.work_dir.display()))?;

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init_metrics().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let schedules = scheduler::spawn_schedules(
        &queue,
        config.recovery_interval,
        config.gc_interval,
        &cancel,
    );

    let addr: SocketAddr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .context("invalid bind address")?
        .next()
        .context("bind address resolved to nothing")?;
    let metrics_enabled = metrics_handle.is_some();
    let state = AppState::new(config, queue, storage);
    let app = create_router(state, metrics_handle);

    info!(%addr, metrics = metrics_enabled, "Serving API");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(ctrl_c())
        .await
        .context("server error")?;

    cancel.cancel();
    for task in schedules {
        if let Err(e) = task.await {
            error!("Scheduled task ended abnormally: {}", e);
        }
    }
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
