//! Application state management

use folio_core::{IntentModelLoader, WorkerConfig};
use std::sync::Arc;

use crate::settings::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Shared by every connection's worker
    pub loader: IntentModelLoader,
}

impl AppState {
    pub fn new(config: AppConfig) -> folio_core::Result<Self> {
        let loader = IntentModelLoader::from_config(&config.worker)?;
        Ok(Self {
            config: Arc::new(config),
            loader,
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        self.config.worker.clone()
    }
}
