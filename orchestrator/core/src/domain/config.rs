// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration
//
// Every field has a default, so an empty YAML document is a valid config.
// Resolution order:
// - explicit --config path (error if unreadable)
// - STEWARD_CONFIG_PATH, ./steward.yaml, ~/.steward/config.yaml, /etc/steward/config.yaml
// - built-in defaults
// followed by STEWARD_* environment overrides and sanitization.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use steward_cortex::LearningConfig;

use super::approval::AutoApproveFlags;
use super::task::ClearanceLevel;

pub const MIN_ANALYSIS_INTERVAL_MS: u64 = 1000;
/// Upper bound for every interval and timeout (one year).
pub const MAX_DURATION_MS: u64 = 365 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Master switch. When off, `start()` logs and returns.
    pub enabled: bool,

    /// Time between analysis ticks (>= 1000).
    pub analysis_interval_ms: u64,

    pub max_concurrent_tasks: usize,

    /// Ceiling for unattended execution.
    pub global_clearance: ClearanceLevel,

    pub auto_approve: AutoApproveFlags,

    /// Upper bound on a single `execute()` call.
    pub task_timeout_ms: u64,

    /// Upper bound on a single source's `analyze()` call.
    pub analysis_timeout_ms: u64,

    /// How long `stop()` waits for in-flight tasks.
    pub shutdown_timeout_ms: u64,

    pub persistence_interval_ms: u64,

    /// Learning state document.
    pub state_path: PathBuf,

    /// Terminal tasks kept in the registry for inspection.
    pub max_finished_tasks: usize,

    pub learning: LearningConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            analysis_interval_ms: 5 * 60 * 1000,
            max_concurrent_tasks: 3,
            global_clearance: ClearanceLevel::Suggest,
            auto_approve: AutoApproveFlags::default(),
            task_timeout_ms: 10 * 60 * 1000,
            analysis_timeout_ms: 60 * 1000,
            shutdown_timeout_ms: 30 * 1000,
            persistence_interval_ms: 60 * 1000,
            state_path: PathBuf::from("./data/steward-learning.json"),
            max_finished_tasks: 500,
            learning: LearningConfig::default(),
        }
    }
}

/// Partial update accepted by `Orchestrator::update_config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfigPatch {
    pub enabled: Option<bool>,
    pub analysis_interval_ms: Option<u64>,
    pub max_concurrent_tasks: Option<usize>,
    pub global_clearance: Option<ClearanceLevel>,
    pub auto_approve: Option<AutoApproveFlags>,
    pub task_timeout_ms: Option<u64>,
    pub analysis_timeout_ms: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
    pub persistence_interval_ms: Option<u64>,
    pub max_finished_tasks: Option<usize>,
    pub learning: Option<LearningConfig>,
}

impl OrchestratorConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Failed to parse config at {:?}", path))
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("STEWARD_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!("STEWARD_CONFIG_PATH points to a missing file: {:?}", path);
        }

        let cwd = PathBuf::from("./steward.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".steward").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/steward/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Loads, applies environment overrides and sanitizes.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else {
            tracing::info!("No configuration file found in standard locations, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        for correction in config.sanitize() {
            tracing::warn!("Configuration corrected: {}", correction);
        }
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies `STEWARD_*` overrides read through `lookup`. Unparseable values
    /// are ignored with a warning.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env_bool(&lookup, "STEWARD_ENABLED") {
            self.enabled = v;
        }
        if let Some(v) = env_parse(&lookup, "STEWARD_ANALYSIS_INTERVAL_MS") {
            self.analysis_interval_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "STEWARD_MAX_CONCURRENT_TASKS") {
            self.max_concurrent_tasks = v;
        }
        if let Some(v) = env_parse(&lookup, "STEWARD_GLOBAL_CLEARANCE") {
            self.global_clearance = v;
        }
        if let Some(v) = env_bool(&lookup, "STEWARD_AUTO_APPROVE_READ_ONLY") {
            self.auto_approve.read_only = v;
        }
        if let Some(v) = env_bool(&lookup, "STEWARD_AUTO_APPROVE_SUGGESTIONS_ONLY") {
            self.auto_approve.suggestions_only = v;
        }
        if let Some(v) = env_bool(&lookup, "STEWARD_AUTO_APPROVE_MODIFY_SAFE") {
            self.auto_approve.modify_safe = v;
        }
        if let Some(v) = env_bool(&lookup, "STEWARD_AUTO_APPROVE_MODIFY_PRODUCTION") {
            self.auto_approve.modify_production = v;
        }
        if let Some(v) = lookup("STEWARD_STATE_PATH").filter(|v| !v.trim().is_empty()) {
            tracing::info!("Environment override: STEWARD_STATE_PATH={}", v);
            self.state_path = PathBuf::from(v);
        }
        if let Some(v) = env_parse(&lookup, "STEWARD_LEARNING_RATE") {
            self.learning.learning_rate = v;
        }
    }

    /// Replaces out-of-range values with defaults and returns one message per
    /// correction.
    pub fn sanitize(&mut self) -> Vec<String> {
        let defaults = Self::default();
        let mut corrections = Vec::new();

        if !(MIN_ANALYSIS_INTERVAL_MS..=MAX_DURATION_MS).contains(&self.analysis_interval_ms) {
            corrections.push(format!(
                "analysisIntervalMs {} outside [{},{}], using {}",
                self.analysis_interval_ms, MIN_ANALYSIS_INTERVAL_MS, MAX_DURATION_MS, defaults.analysis_interval_ms
            ));
            self.analysis_interval_ms = defaults.analysis_interval_ms;
        }
        if self.max_concurrent_tasks == 0 {
            corrections.push(format!(
                "maxConcurrentTasks must be >= 1, using {}",
                defaults.max_concurrent_tasks
            ));
            self.max_concurrent_tasks = defaults.max_concurrent_tasks;
        }

        let timeouts = [
            ("taskTimeoutMs", &mut self.task_timeout_ms, defaults.task_timeout_ms),
            ("analysisTimeoutMs", &mut self.analysis_timeout_ms, defaults.analysis_timeout_ms),
            ("shutdownTimeoutMs", &mut self.shutdown_timeout_ms, defaults.shutdown_timeout_ms),
            (
                "persistenceIntervalMs",
                &mut self.persistence_interval_ms,
                defaults.persistence_interval_ms,
            ),
        ];
        for (name, value, default) in timeouts {
            if *value == 0 || *value > MAX_DURATION_MS {
                corrections.push(format!(
                    "{} {} outside [1,{}], using {}",
                    name, value, MAX_DURATION_MS, default
                ));
                *value = default;
            }
        }

        if self.max_finished_tasks == 0 {
            corrections.push(format!(
                "maxFinishedTasks must be >= 1, using {}",
                defaults.max_finished_tasks
            ));
            self.max_finished_tasks = defaults.max_finished_tasks;
        }

        if self.state_path.as_os_str().is_empty() {
            corrections.push(format!("statePath is empty, using {:?}", defaults.state_path));
            self.state_path = defaults.state_path;
        }

        corrections.extend(self.learning.sanitize());
        corrections
    }

    pub fn apply(&mut self, patch: OrchestratorConfigPatch) {
        let OrchestratorConfigPatch {
            enabled,
            analysis_interval_ms,
            max_concurrent_tasks,
            global_clearance,
            auto_approve,
            task_timeout_ms,
            analysis_timeout_ms,
            shutdown_timeout_ms,
            persistence_interval_ms,
            max_finished_tasks,
            learning,
        } = patch;

        if let Some(v) = enabled {
            self.enabled = v;
        }
        if let Some(v) = analysis_interval_ms {
            self.analysis_interval_ms = v;
        }
        if let Some(v) = max_concurrent_tasks {
            self.max_concurrent_tasks = v;
        }
        if let Some(v) = global_clearance {
            self.global_clearance = v;
        }
        if let Some(v) = auto_approve {
            self.auto_approve = v;
        }
        if let Some(v) = task_timeout_ms {
            self.task_timeout_ms = v;
        }
        if let Some(v) = analysis_timeout_ms {
            self.analysis_timeout_ms = v;
        }
        if let Some(v) = shutdown_timeout_ms {
            self.shutdown_timeout_ms = v;
        }
        if let Some(v) = persistence_interval_ms {
            self.persistence_interval_ms = v;
        }
        if let Some(v) = max_finished_tasks {
            self.max_finished_tasks = v;
        }
        if let Some(v) = learning {
            self.learning = v;
        }
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn persistence_interval(&self) -> Duration {
        Duration::from_millis(self.persistence_interval_ms)
    }
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let val = lookup(key)?;
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => {
            tracing::info!("Environment override: {}=true", key);
            Some(true)
        }
        "false" | "0" | "no" | "off" => {
            tracing::info!("Environment override: {}=false", key);
            Some(false)
        }
        _ => {
            tracing::warn!("Invalid value for {}: '{}'. Expected true/false. Ignoring.", key, val);
            None
        }
    }
}

fn env_parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let val = lookup(key)?;
    match val.trim().parse() {
        Ok(parsed) => {
            tracing::info!("Environment override: {}={}", key, val);
            Some(parsed)
        }
        Err(_) => {
            tracing::warn!("Invalid value for {}: '{}'. Ignoring.", key, val);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert!(config.enabled);
        assert_eq!(config.analysis_interval(), Duration::from_secs(300));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.persistence_interval(), Duration::from_secs(60));
        assert!(config.auto_approve.read_only);
        assert!(!config.auto_approve.modify_production);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
maxConcurrentTasks: 2
globalClearance: MODIFY_SAFE
autoApprove:
  modifySafe: true
learning:
  learningRate: 0.3
"#;
        let config = OrchestratorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.global_clearance, ClearanceLevel::ModifySafe);
        assert!(config.auto_approve.modify_safe);
        assert!(config.auto_approve.read_only);
        assert_eq!(config.learning.learning_rate, 0.3);
        assert_eq!(config.learning.confidence_threshold, 0.7);
        assert_eq!(config.analysis_interval_ms, 300_000);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(OrchestratorConfig::from_yaml_str("  \n").unwrap(), OrchestratorConfig::default());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = OrchestratorConfig::default();
        config.global_clearance = ClearanceLevel::ModifyProduction;
        config.learning.auto_adapt = false;

        let yaml = config.to_yaml_string().unwrap();
        assert!(yaml.contains("globalClearance: MODIFY_PRODUCTION"));
        assert_eq!(OrchestratorConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = OrchestratorConfig::default();
        config.apply_overrides_from(lookup(&[
            ("STEWARD_ENABLED", "off"),
            ("STEWARD_MAX_CONCURRENT_TASKS", "8"),
            ("STEWARD_GLOBAL_CLEARANCE", "modify-safe"),
            ("STEWARD_AUTO_APPROVE_MODIFY_SAFE", "yes"),
            ("STEWARD_STATE_PATH", "/var/lib/steward/state.json"),
            ("STEWARD_LEARNING_RATE", "0.25"),
        ]));

        assert!(!config.enabled);
        assert_eq!(config.max_concurrent_tasks, 8);
        assert_eq!(config.global_clearance, ClearanceLevel::ModifySafe);
        assert!(config.auto_approve.modify_safe);
        assert_eq!(config.state_path, PathBuf::from("/var/lib/steward/state.json"));
        assert_eq!(config.learning.learning_rate, 0.25);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = OrchestratorConfig::default();
        config.apply_overrides_from(lookup(&[
            ("STEWARD_ENABLED", "maybe"),
            ("STEWARD_ANALYSIS_INTERVAL_MS", "soon"),
            ("STEWARD_GLOBAL_CLEARANCE", "root"),
        ]));
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_sanitize_corrects_out_of_range_values() {
        let mut config = OrchestratorConfig {
            analysis_interval_ms: 10,
            max_concurrent_tasks: 0,
            task_timeout_ms: 0,
            ..OrchestratorConfig::default()
        };
        config.learning.learning_rate = 4.0;

        let corrections = config.sanitize();

        assert_eq!(corrections.len(), 4);
        assert_eq!(config.analysis_interval_ms, 300_000);
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.task_timeout_ms, 600_000);
        assert_eq!(config.learning.learning_rate, 0.1);
        assert!(OrchestratorConfig::default().sanitize().is_empty());
    }

    #[test]
    fn test_sanitize_bounds_durations_and_retention() {
        let mut config = OrchestratorConfig {
            analysis_interval_ms: u64::MAX,
            shutdown_timeout_ms: u64::MAX,
            persistence_interval_ms: MAX_DURATION_MS + 1,
            max_finished_tasks: 0,
            ..OrchestratorConfig::default()
        };
        config.learning.retention_days = 200_000_000;

        let corrections = config.sanitize();

        assert_eq!(corrections.len(), 5);
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let mut config = OrchestratorConfig::default();
        config.apply(OrchestratorConfigPatch {
            max_concurrent_tasks: Some(5),
            global_clearance: Some(ClearanceLevel::ReadOnly),
            ..OrchestratorConfigPatch::default()
        });
        assert_eq!(config.max_concurrent_tasks, 5);
        assert_eq!(config.global_clearance, ClearanceLevel::ReadOnly);
        assert_eq!(config.analysis_interval_ms, 300_000);
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OrchestratorConfig::load_or_default(Some(dir.path().join("nope.yaml")));
        assert!(err.is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steward.yaml");
        std::fs::write(&path, "analysisIntervalMs: 500\nmaxConcurrentTasks: 4\n").unwrap();

        let config = OrchestratorConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(config.max_concurrent_tasks, 4);
        // Sanitized back to the default.
        assert_eq!(config.analysis_interval_ms, 300_000);
    }
}
