//! Folio Core - simulated on-device model worker
//!
//! This crate implements the background worker behind the portfolio site's AI
//! demo: a tiny and a full model tier, keyword-weight intent classification and
//! a scripted multi-step agent. Model work is simulated with fixed delays.
//!
//! # Architecture
//!
//! - A single actor task owns all state and handles one message at a time
//! - Simulated waits run in spawned tasks and report back as events
//! - Inference and agent runs are single-flight: extra requests are dropped
//! - Agent runs are cancellable mid-step
//!
//! # Example
//!
//! ```ignore
//! use folio_core::{Inbound, IntentModelLoader, Worker, WorkerConfig};
//!
//! let (worker, mut replies) = Worker::spawn(WorkerConfig::default(), IntentModelLoader::builtin());
//! worker.send(Inbound::LoadTinyModel)?;
//! worker.send(Inbound::Infer { text: Some("show me your projects".into()) })?;
//!
//! while let Some(reply) = replies.recv().await {
//!     println!("{}", reply.to_json()?);
//! }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod protocol;
pub mod worker;

pub use config::{ServerConfig, WorkerConfig};
pub use error::{Error, Result};
pub use model::{IntentModel, IntentModelLoader, IntentSource, ModelTier};
pub use protocol::{Inbound, Outbound};
pub use worker::{StatsSnapshot, Worker, WorkerHandle};
