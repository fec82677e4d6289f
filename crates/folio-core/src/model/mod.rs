//! Intent model and simulated model tiers

mod intent;
mod loader;
mod state;

pub use intent::{Classification, Intent, IntentModel, Keyword, DEFAULT_INTENT};
pub use loader::{IntentModelLoader, IntentSource};
pub use state::{ModelState, ModelTier};
