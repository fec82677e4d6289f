//! Single-flight inference slot and simulated compute cost

use std::time::Duration;
use tokio::time::Instant;

use crate::config::WorkerConfig;
use crate::model::ModelTier;
use crate::protocol::InferResult;

/// Simulated compute cost for one inference on `tier`
pub fn compute_cost(config: &WorkerConfig, tier: ModelTier) -> Duration {
    match tier {
        ModelTier::Tiny => Duration::from_millis(config.tiny_infer_ms),
        ModelTier::Full => Duration::from_millis(config.full_infer_ms),
    }
}

/// An accepted inference waiting for its simulated compute to finish
#[derive(Debug, Clone)]
pub struct InferenceJob {
    pub started: Instant,
    pub tier: ModelTier,
    pub intent: String,
}

impl InferenceJob {
    pub fn finish(self) -> InferResult {
        InferResult {
            latency: self.started.elapsed().as_millis() as u64,
            model: self.tier,
            intent: self.intent,
        }
    }
}

/// At most one inference is in flight; later requests are dropped, not queued.
#[derive(Debug, Default)]
pub enum InferenceSlot {
    #[default]
    Idle,
    Busy,
}

impl InferenceSlot {
    pub fn is_busy(&self) -> bool {
        matches!(self, InferenceSlot::Busy)
    }

    /// Claim the slot. Returns false if an inference is already running.
    pub fn try_acquire(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        *self = InferenceSlot::Busy;
        true
    }

    pub fn release(&mut self) {
        *self = InferenceSlot::Idle;
    }
}
