//! Error types for the Folio demo worker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The only failure a host ever sees on the wire; the text is the `error` payload.
    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Intent model error: {0}")]
    IntentModelError(String),

    #[error("Worker has shut down")]
    WorkerClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
