use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::aggregation::{
    DEFAULT_REVENUE_EVENT_TYPE, DEFAULT_REVENUE_METRIC, DEFAULT_REVENUE_PROPERTY,
};
use crate::error::{LabError, Result};

/// Database file name used when `[storage] database_path` is unset.
pub const DEFAULT_DATABASE_FILE: &str = "splitlab.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assignment: AssignmentConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Load configuration: an explicit file (argument or `SPLITLAB_CONFIG`)
    /// replaces the global/project pair; environment overrides apply last.
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let global = dirs::config_dir().map(|dir| dir.join("splitlab/config.toml"));
        Self::load_with(explicit_path, root, global.as_deref(), |key| {
            std::env::var(key).ok()
        })
    }

    /// [`Config::load`] with the global path and environment made explicit.
    pub fn load_with<F>(
        explicit_path: Option<&Path>,
        root: &Path,
        global_path: Option<&Path>,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| env("SPLITLAB_CONFIG").map(PathBuf::from));

        if let Some(path) = explicit {
            match Self::load_patch(&path)? {
                Some(patch) => config.merge_patch(patch),
                None => {
                    return Err(LabError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
            }
        } else {
            if let Some(global) = global_path {
                if let Some(patch) = Self::load_patch(global)? {
                    config.merge_patch(patch);
                }
            }
            if let Some(project) = Self::load_patch(&root.join("config.toml"))? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides(&env)?;
        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| LabError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| LabError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.storage {
            self.storage.merge(patch);
        }
        if let Some(patch) = patch.assignment {
            self.assignment.merge(patch);
        }
        if let Some(patch) = patch.metrics {
            self.metrics.merge(patch);
        }
        if let Some(patch) = patch.report {
            self.report.merge(patch);
        }
    }

    fn apply_env_overrides<F>(&mut self, env: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env("SPLITLAB_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(value));
        }

        if let Some(value) = env_bool(env, "SPLITLAB_REQUIRE_RUNNING") {
            self.assignment.require_running = value;
        }
        if let Some(value) = env_u64(env, "SPLITLAB_SEED")? {
            self.assignment.seed = Some(value);
        }

        if let Some(value) = env_string(env, "SPLITLAB_REVENUE_EVENT_TYPE") {
            self.metrics.revenue_event_type = value;
        }
        if let Some(value) = env_string(env, "SPLITLAB_REVENUE_PROPERTY") {
            self.metrics.revenue_property = value;
        }
        if let Some(value) = env_string(env, "SPLITLAB_REVENUE_METRIC") {
            self.metrics.revenue_metric = value;
        }

        if let Some(value) = env_bool(env, "SPLITLAB_DAILY_VOLUME") {
            self.report.include_daily_volume = value;
        }
        if let Some(value) = env_bool(env, "SPLITLAB_WEEKLY_VOLUME") {
            self.report.include_weekly_volume = value;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Relative paths resolve against the splitlab root.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    #[must_use]
    pub fn resolve_database_path(&self, root: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(DEFAULT_DATABASE_FILE),
        }
    }

    fn merge(&mut self, patch: StoragePatch) {
        if let Some(value) = patch.database_path {
            self.database_path = Some(value);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// Only RUNNING experiments hand out new assignments.
    #[serde(default)]
    pub require_running: bool,
    /// Seed for reproducible allocation draws.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl AssignmentConfig {
    fn merge(&mut self, patch: AssignmentPatch) {
        if let Some(value) = patch.require_running {
            self.require_running = value;
        }
        if let Some(value) = patch.seed {
            self.seed = Some(value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub revenue_event_type: String,
    #[serde(default)]
    pub revenue_property: String,
    #[serde(default)]
    pub revenue_metric: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            revenue_event_type: DEFAULT_REVENUE_EVENT_TYPE.to_string(),
            revenue_property: DEFAULT_REVENUE_PROPERTY.to_string(),
            revenue_metric: DEFAULT_REVENUE_METRIC.to_string(),
        }
    }
}

impl MetricsConfig {
    fn merge(&mut self, patch: MetricsPatch) {
        if let Some(value) = patch.revenue_event_type {
            self.revenue_event_type = value;
        }
        if let Some(value) = patch.revenue_property {
            self.revenue_property = value;
        }
        if let Some(value) = patch.revenue_metric {
            self.revenue_metric = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub include_daily_volume: bool,
    #[serde(default)]
    pub include_weekly_volume: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_daily_volume: true,
            include_weekly_volume: true,
        }
    }
}

impl ReportConfig {
    fn merge(&mut self, patch: ReportPatch) {
        if let Some(value) = patch.include_daily_volume {
            self.include_daily_volume = value;
        }
        if let Some(value) = patch.include_weekly_volume {
            self.include_weekly_volume = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub storage: Option<StoragePatch>,
    pub assignment: Option<AssignmentPatch>,
    pub metrics: Option<MetricsPatch>,
    pub report: Option<ReportPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoragePatch {
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AssignmentPatch {
    pub require_running: Option<bool>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MetricsPatch {
    pub revenue_event_type: Option<String>,
    pub revenue_property: Option<String>,
    pub revenue_metric: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ReportPatch {
    pub include_daily_volume: Option<bool>,
    pub include_weekly_volume: Option<bool>,
}

fn env_string<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> Option<String> {
    env(key).filter(|value| !value.trim().is_empty())
}

fn env_bool<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> Option<bool> {
    env(key).map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_u64<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> Result<Option<u64>> {
    match env(key) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|err| LabError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}
