//! Application state.

use std::sync::Arc;

use hlsq_queue::JobQueue;
use hlsq_storage::Storage;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: JobQueue,
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(config: ApiConfig, queue: JobQueue, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            queue,
            storage,
        }
    }
}
