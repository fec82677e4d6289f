//! Load state of the two simulated model tiers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::ModelStatus;

/// Simulated competency tier. `Full` is slower to load and faster per inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Tiny,
    Full,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Tiny => write!(f, "tiny"),
            ModelTier::Full => write!(f, "full"),
        }
    }
}

/// Lifecycle of a single tier. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LoadState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
}

#[derive(Debug, Clone, Default)]
pub struct ModelState {
    tiny: LoadState,
    full: LoadState,
}

impl ModelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `tier` from `NotLoaded` to `Loading`.
    ///
    /// Returns false when the tier is already loading or loaded, in which case
    /// the caller must treat the request as a no-op.
    pub fn begin_load(&mut self, tier: ModelTier) -> bool {
        let slot = self.slot_mut(tier);
        if *slot != LoadState::NotLoaded {
            return false;
        }
        *slot = LoadState::Loading;
        true
    }

    pub fn finish_load(&mut self, tier: ModelTier) {
        *self.slot_mut(tier) = LoadState::Loaded;
    }

    pub fn tiny_loaded(&self) -> bool {
        self.tiny == LoadState::Loaded
    }

    pub fn full_loaded(&self) -> bool {
        self.full == LoadState::Loaded
    }

    /// Tier used for an inference started now
    pub fn active_tier(&self) -> ModelTier {
        if self.full_loaded() {
            ModelTier::Full
        } else {
            ModelTier::Tiny
        }
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            tiny: self.tiny_loaded(),
            full: self.full_loaded(),
        }
    }

    fn slot_mut(&mut self, tier: ModelTier) -> &mut LoadState {
        match tier {
            ModelTier::Tiny => &mut self.tiny,
            ModelTier::Full => &mut self.full,
        }
    }
}
