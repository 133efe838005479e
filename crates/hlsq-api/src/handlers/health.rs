//! Liveness and readiness probes.

use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Always 200 while the process is serving.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Outcome of one dependency check.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Probe {
    Ok { latency_ms: u64 },
    Error { error: String },
}

impl Probe {
    async fn run<E: Display>(check: impl Future<Output = Result<(), E>>) -> Self {
        let started = Instant::now();
        match check.await {
            Ok(()) => Probe::Ok {
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Err(e) => Probe::Error { error: e.to_string() },
        }
    }

    fn passed(&self) -> bool {
        matches!(self, Probe::Ok { .. })
    }
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub store: Probe,
    pub storage: Probe,
}

/// 200 when both the job store and artifact storage answer, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let (store, storage) = tokio::join!(
        Probe::run(state.queue.ping()),
        Probe::run(state.storage.check_connectivity()),
    );

    if store.passed() && storage.passed() {
        let body = Readiness { status: "ready", store, storage };
        (StatusCode::OK, Json(body))
    } else {
        let body = Readiness { status: "degraded", store, storage };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}
