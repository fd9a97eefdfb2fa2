//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Tunable engine settings.  All fields have sensible defaults; a config
/// file only needs to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `workflows.json` and `intents.json`.
    pub data_dir: PathBuf,
    /// Scheduler tick period in milliseconds.
    pub scheduler_tick_ms: u64,
    /// Proactive intent tick period in milliseconds.
    pub proactive_tick_ms: u64,
    /// Default per-step timeout in milliseconds.
    pub default_step_timeout_ms: u64,
    /// Default timeout for agent-delegated steps in milliseconds.
    pub default_agent_timeout_ms: u64,
    /// Event bus channel capacity.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            scheduler_tick_ms: 60_000,
            proactive_tick_ms: 60_000,
            default_step_timeout_ms: 60_000,
            default_agent_timeout_ms: 300_000,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Defaults with a custom data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Path of the workflow collection file.
    pub fn workflows_path(&self) -> PathBuf {
        self.data_dir.join("workflows.json")
    }

    /// Path of the intent collection file.
    pub fn intents_path(&self) -> PathBuf {
        self.data_dir.join("intents.json")
    }

    /// The data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_to_partial_config() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"scheduler_tick_ms": 1000}"#).unwrap();
        assert_eq!(config.scheduler_tick_ms, 1_000);
        assert_eq!(config.proactive_tick_ms, 60_000);
        assert_eq!(config.default_step_timeout_ms, 60_000);
        assert_eq!(config.default_agent_timeout_ms, 300_000);
    }

    #[test]
    fn collection_paths_live_under_data_dir() {
        let config = EngineConfig::with_data_dir("/tmp/autoflow");
        assert_eq!(
            config.workflows_path(),
            PathBuf::from("/tmp/autoflow/workflows.json")
        );
        assert_eq!(
            config.intents_path(),
            PathBuf::from("/tmp/autoflow/intents.json")
        );
    }
}
