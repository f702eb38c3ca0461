//! Run-control configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::stepqueue::StepQueueConfig;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Step queue manager settings
    #[serde(rename = "step-queue")]
    pub step_queue: StepQueueConfig,

    /// Simulated back end used by `rc simulate`
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .runcontrol.yml
        let local_config = PathBuf::from(".runcontrol.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/runcontrol/runcontrol.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("runcontrol").join("runcontrol.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Simulated back end behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// How long a step runs before the thread stops again
    #[serde(rename = "step-latency-ms")]
    pub step_latency_ms: u64,

    /// Finish steps automatically after the latency; when false steps only
    /// finish through an explicit completion
    #[serde(rename = "auto-complete-steps")]
    pub auto_complete_steps: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_latency_ms: 100,
            auto_complete_steps: true,
        }
    }
}

impl SimulationConfig {
    pub fn step_latency(&self) -> Duration {
        Duration::from_millis(self.step_latency_ms)
    }
}
