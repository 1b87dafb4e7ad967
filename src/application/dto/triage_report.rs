//! Triage report DTO

use crate::domain::entities::{DiskImageMetadata, RegistryKeyRecord};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// What happened to one hive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HiveStatus {
    /// Traversed; `records` keys were recorded
    Extracted { records: usize },
    /// No candidate path exists in the filesystem
    Unresolved { attempted: Vec<String> },
    /// The copy failed the signature or size check
    Corrupted { reason: String },
    /// Copying or opening failed
    Failed { reason: String },
}

impl fmt::Display for HiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extracted { records } => write!(f, "extracted ({records} keys)"),
            Self::Unresolved { attempted } => write!(f, "not found ({} paths tried)", attempted.len()),
            Self::Corrupted { reason } => write!(f, "corrupted: {reason}"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Per-hive outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiveOutcome {
    /// Hive name, e.g. `SYSTEM` or `NTUSER_alice`
    pub hive: String,
    /// Path inside the evidence, when resolved
    pub source_path: Option<String>,
    pub status: HiveStatus,
}

/// Aggregate counts over extracted registry keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatistics {
    pub total_keys: usize,
    pub total_values: usize,
    pub total_subkeys: usize,
    pub executable_references: usize,
    pub keys_per_hive: BTreeMap<String, usize>,
    pub value_types: BTreeMap<String, usize>,
}

impl RegistryStatistics {
    pub fn from_records(records: &[RegistryKeyRecord]) -> Self {
        let mut stats = Self {
            total_keys: records.len(),
            ..Self::default()
        };
        for record in records {
            stats.total_values += record.value_count();
            stats.total_subkeys += record.subkey_count();
            *stats.keys_per_hive.entry(record.hive.clone()).or_insert(0) += 1;
            for value in record.values.values() {
                *stats.value_types.entry(value.value_type.clone()).or_insert(0) += 1;
                if value.references_executable() {
                    stats.executable_references += 1;
                }
            }
        }
        stats
    }

    /// Logs the statistics at info level
    pub fn log(&self) {
        info!("Registry statistics:");
        info!("  Total keys: {}", self.total_keys);
        info!("  Total values: {}", self.total_values);
        info!("  Total subkeys: {}", self.total_subkeys);
        info!("  Executable references: {}", self.executable_references);
        for (hive, count) in &self.keys_per_hive {
            info!("  {}: {} keys", hive, count);
        }
        for (value_type, count) in &self.value_types {
            info!("  {}: {} values", value_type, count);
        }
    }
}

/// Result of a triage run
#[derive(Debug, Clone, Default)]
pub struct TriageReport {
    /// Evidence container path
    pub source: String,
    pub output_dir: PathBuf,
    pub image: Option<DiskImageMetadata>,
    pub filesystem_type: Option<String>,
    pub entries_recorded: usize,
    /// Entries without metadata or with no size
    pub entries_skipped: usize,
    /// Directories that could not be listed
    pub entry_failures: usize,
    pub artifacts_captured: usize,
    pub capture_failures: usize,
    pub hives: Vec<HiveOutcome>,
    pub registry_records: usize,
    /// Keys that could not be opened during traversal
    pub keys_skipped: usize,
    /// Values that could not be read during traversal
    pub values_skipped: usize,
    pub file_anomalies: usize,
    pub registry_anomalies: usize,
    /// Offsets of container chunks that were zero-filled
    pub bad_chunks: Vec<u64>,
    /// Files written to the output directory
    pub outputs: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub duration: Duration,
}

impl TriageReport {
    pub fn new(source: String, output_dir: PathBuf) -> Self {
        Self {
            source,
            output_dir,
            ..Self::default()
        }
    }

    /// Records a non-fatal error
    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_output(&mut self, path: PathBuf) {
        self.outputs.push(path);
    }

    pub fn hives_extracted(&self) -> usize {
        self.hives
            .iter()
            .filter(|h| matches!(h.status, HiveStatus::Extracted { .. }))
            .count()
    }

    /// Returns a summary string
    pub fn summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str(&format!(
            "Triage complete: {} entries recorded, {} skipped, {} failed\n",
            self.entries_recorded, self.entries_skipped, self.entry_failures
        ));
        if let Some(fs_type) = &self.filesystem_type {
            summary.push_str(&format!("Filesystem: {}\n", fs_type));
        }
        summary.push_str(&format!(
            "Artifacts captured: {} ({} failed)\n",
            self.artifacts_captured, self.capture_failures
        ));
        summary.push_str(&format!(
            "Hives: {}/{} extracted, {} registry keys\n",
            self.hives_extracted(),
            self.hives.len(),
            self.registry_records
        ));
        for hive in &self.hives {
            summary.push_str(&format!("  {:<20} {}\n", hive.hive, hive.status));
        }
        summary.push_str(&format!(
            "Anomalies: {} file, {} registry\n",
            self.file_anomalies, self.registry_anomalies
        ));
        if !self.bad_chunks.is_empty() {
            summary.push_str(&format!("Bad chunks zero-filled: {}\n", self.bad_chunks.len()));
        }
        summary.push_str(&format!("Duration: {:.2}s\n", self.duration.as_secs_f64()));

        if !self.errors.is_empty() {
            summary.push_str(&format!("\nErrors ({}):\n", self.errors.len()));
            for error in self.errors.iter().take(5) {
                summary.push_str(&format!("  - {}\n", error));
            }
            if self.errors.len() > 5 {
                summary.push_str(&format!("  ... and {} more\n", self.errors.len() - 5));
            }
        }

        summary
    }
}
