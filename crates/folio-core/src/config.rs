//! Configuration types for the Folio worker and its host server

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
///
/// All delays are simulated costs standing in for real model work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Remote intent model resource; takes precedence over `intent_model_path`
    #[serde(default)]
    pub intent_model_url: Option<String>,

    /// Bundled intent model file
    #[serde(default)]
    pub intent_model_path: Option<PathBuf>,

    /// Timeout for fetching the intent model over HTTP
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Simulated tiny model load
    #[serde(default = "default_tiny_load_delay_ms")]
    pub tiny_load_delay_ms: u64,

    /// Simulated full model download
    #[serde(default = "default_full_load_delay_ms")]
    pub full_load_delay_ms: u64,

    /// Per-inference cost while only the tiny model is loaded
    #[serde(default = "default_tiny_infer_ms")]
    pub tiny_infer_ms: u64,

    /// Per-inference cost once the full model is loaded
    #[serde(default = "default_full_infer_ms")]
    pub full_infer_ms: u64,

    /// Pause between the planning status and the plan
    #[serde(default = "default_agent_planning_ms")]
    pub agent_planning_ms: u64,

    /// Pause per executed agent step
    #[serde(default = "default_agent_step_ms")]
    pub agent_step_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            intent_model_url: None,
            intent_model_path: None,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            tiny_load_delay_ms: default_tiny_load_delay_ms(),
            full_load_delay_ms: default_full_load_delay_ms(),
            tiny_infer_ms: default_tiny_infer_ms(),
            full_infer_ms: default_full_infer_ms(),
            agent_planning_ms: default_agent_planning_ms(),
            agent_step_ms: default_agent_step_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn tiny_load_delay(&self) -> Duration {
        Duration::from_millis(self.tiny_load_delay_ms)
    }

    pub fn full_load_delay(&self) -> Duration {
        Duration::from_millis(self.full_load_delay_ms)
    }

    pub fn agent_planning_delay(&self) -> Duration {
        Duration::from_millis(self.agent_planning_ms)
    }

    pub fn agent_step_delay(&self) -> Duration {
        Duration::from_millis(self.agent_step_ms)
    }
}

fn default_fetch_timeout_ms() -> u64 {
    3000
}

fn default_tiny_load_delay_ms() -> u64 {
    150
}

fn default_full_load_delay_ms() -> u64 {
    600
}

fn default_tiny_infer_ms() -> u64 {
    12
}

fn default_full_infer_ms() -> u64 {
    6
}

fn default_agent_planning_ms() -> u64 {
    300
}

fn default_agent_step_ms() -> u64 {
    400
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_enabled")]
    pub cors_enabled: bool,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_cors_enabled(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_enabled() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}
