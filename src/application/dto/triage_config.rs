//! Triage configuration DTO
//!
//! Every knob of a triage run, loadable from a JSON file. Missing fields
//! take their defaults, so an empty `{}` is a valid configuration.

use crate::domain::entities::TargetPathTable;
use crate::domain::services::{
    BadChunkPolicy, BudgetScope, DEFAULT_CHUNK_SIZE, DEFAULT_SIZE_THRESHOLD, DuplicatePolicy,
};
use crate::infrastructure::persistence::DEFAULT_COPY_CHUNK;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration for '{field}': {message}")]
    Invalid { field: String, message: String },
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Evidence container settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    /// Read chunk size in bytes
    pub chunk_size: usize,
    pub bad_chunk_policy: BadChunkPolicy,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            bad_chunk_policy: BadChunkPolicy::default(),
        }
    }
}

/// Filesystem walker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerOptions {
    /// Directory the walk starts at
    pub root: String,
    /// Children of the root are level 0; directories below this are not descended
    pub max_depth: usize,
    /// Copy log-like files to `extracted_logs/`
    pub capture_logs: bool,
    /// Copy hive-like files to `extracted_registry/` and extract them
    pub capture_hives: bool,
    /// Chunk size for captures in bytes
    pub capture_chunk_size: usize,
}

impl Default for WalkerOptions {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            max_depth: 2,
            capture_logs: true,
            capture_hives: false,
            capture_chunk_size: DEFAULT_COPY_CHUNK,
        }
    }
}

/// Where key traversal starts inside each hive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalStart {
    /// At each interesting key path, or the root when a hive has none
    #[default]
    InterestingPaths,
    /// Always at the hive root
    Root,
}

/// Registry extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    pub enabled: bool,
    pub include_user_hives: bool,
    /// Deepest key level below a traversal start that is still visited
    pub max_depth: usize,
    /// Maximum number of key records
    pub entry_limit: usize,
    pub budget_scope: BudgetScope,
    pub start: TraversalStart,
    /// Traverse hives in parallel once their copies exist
    pub parallel_hives: bool,
    pub targets: TargetPathTable,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            include_user_hives: true,
            max_depth: 2,
            entry_limit: 350,
            budget_scope: BudgetScope::default(),
            start: TraversalStart::default(),
            parallel_hives: false,
            targets: TargetPathTable::default(),
        }
    }
}

/// Anomaly detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyOptions {
    /// Standard deviations from the mean before a size is unusual
    pub size_threshold: f64,
    pub duplicate_policy: DuplicatePolicy,
    /// Also run detection over registry records
    pub include_registry: bool,
}

impl Default for AnomalyOptions {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            duplicate_policy: DuplicatePolicy::default(),
            include_registry: true,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub features_csv: bool,
    pub cleaned_csv: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            features_csv: true,
            cleaned_csv: true,
        }
    }
}

/// Complete triage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub container: ContainerOptions,
    pub walker: WalkerOptions,
    pub registry: RegistryOptions,
    pub anomaly: AnomalyOptions,
    pub export: ExportOptions,
}

impl TriageConfig {
    /// Loads and validates a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parses and validates a JSON configuration string
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty JSON form, e.g. to write a starting config
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.container.chunk_size == 0 {
            return Err(invalid("container.chunk_size", "must be greater than zero"));
        }
        if self.walker.capture_chunk_size == 0 {
            return Err(invalid("walker.capture_chunk_size", "must be greater than zero"));
        }
        if self.walker.root.is_empty() {
            return Err(invalid("walker.root", "must not be empty"));
        }
        if !self.anomaly.size_threshold.is_finite() || self.anomaly.size_threshold < 0.0 {
            return Err(invalid(
                "anomaly.size_threshold",
                "must be a finite, non-negative number",
            ));
        }
        for hive in &self.registry.targets.hives {
            if hive.name.trim().is_empty() {
                return Err(invalid("registry.targets.hives.name", "must not be empty"));
            }
            if hive.base_paths.is_empty() {
                return Err(invalid(
                    "registry.targets.hives.base_paths",
                    &format!("hive {} has no candidate paths", hive.name),
                ));
            }
        }
        Ok(())
    }
}
