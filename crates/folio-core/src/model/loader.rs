//! Best-effort retrieval of the intent model resource

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::model::intent::IntentModel;

/// Where the intent model comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentSource {
    /// Use the built-in one-intent model
    Builtin,
    File(PathBuf),
    Http(String),
}

impl IntentSource {
    /// A URL wins over a path; neither means the built-in model.
    pub fn from_config(config: &WorkerConfig) -> Self {
        if let Some(url) = &config.intent_model_url {
            IntentSource::Http(url.clone())
        } else if let Some(path) = &config.intent_model_path {
            IntentSource::File(path.clone())
        } else {
            IntentSource::Builtin
        }
    }
}

/// Loads the intent model, falling back to [`IntentModel::fallback`] on any failure
#[derive(Debug, Clone)]
pub struct IntentModelLoader {
    source: IntentSource,
    client: reqwest::Client,
}

impl IntentModelLoader {
    pub fn new(source: IntentSource, config: &WorkerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()?;
        Ok(Self { source, client })
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        Self::new(IntentSource::from_config(config), config)
    }

    /// Loader that never touches the network or the filesystem
    pub fn builtin() -> Self {
        Self {
            source: IntentSource::Builtin,
            client: reqwest::Client::new(),
        }
    }

    pub fn source(&self) -> &IntentSource {
        &self.source
    }

    /// Retrieve and parse the configured resource, surfacing every failure.
    pub async fn fetch(&self) -> Result<IntentModel> {
        match &self.source {
            IntentSource::Builtin => {
                debug!("No intent model source configured, using built-in model");
                Ok(IntentModel::fallback())
            }
            IntentSource::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                IntentModel::from_json(&bytes)
            }
            IntentSource::Http(url) => {
                let response = self.client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::IntentModelError(format!(
                        "GET {} returned {}",
                        url, status
                    )));
                }
                let bytes = response.bytes().await?;
                IntentModel::from_json(&bytes)
            }
        }
    }

    /// Like [`fetch`](Self::fetch) but never fails.
    pub async fn load_or_default(&self) -> IntentModel {
        match self.fetch().await {
            Ok(model) => {
                info!(
                    "Loaded intent model with {} intents from {:?}",
                    model.len(),
                    self.source
                );
                model
            }
            Err(e) => {
                warn!(
                    "Failed to load intent model from {:?}, using fallback: {}",
                    self.source, e
                );
                IntentModel::fallback()
            }
        }
    }
}
