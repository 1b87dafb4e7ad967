//! Anomaly detector
//!
//! Statistical and rule heuristics over extracted metadata. Works over any
//! record kind implementing [`Triageable`].

use crate::domain::entities::{AnomalyRecord, FilesystemEntry, RegistryKeyRecord, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of standard deviations before a size is unusual
pub const DEFAULT_SIZE_THRESHOLD: f64 = 2.0;

/// Reason attached to hidden-name matches
pub const HIDDEN_REASON: &str = "anomaly detected";

/// Reason attached to malformed timestamps
pub const MALFORMED_TIMESTAMP_REASON: &str = "Invalid timestamp format";

/// What to emit when one record triggers several rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// One anomaly per matching rule
    #[default]
    PerRule,
    /// One anomaly per record, reasons joined with `; `
    Merge,
}

/// A record the detector can reason about
pub trait Triageable: Clone {
    /// Whether this record kind carries sizes at all
    const HAS_SIZE: bool;

    /// Size of a file-type record; `None` for directories and keys
    fn file_size(&self) -> Option<u64>;

    /// Named timestamps checked for future and malformed values
    fn checked_timestamps(&self) -> Vec<(&'static str, Timestamp)>;

    /// Last component of the record's path
    fn base_name(&self) -> &str;
}

impl Triageable for FilesystemEntry {
    const HAS_SIZE: bool = true;

    fn file_size(&self) -> Option<u64> {
        self.is_file().then_some(self.size)
    }

    fn checked_timestamps(&self) -> Vec<(&'static str, Timestamp)> {
        vec![
            ("created_time", self.created_time.clone()),
            ("modified_time", self.modified_time.clone()),
        ]
    }

    fn base_name(&self) -> &str {
        self.name()
    }
}

impl Triageable for RegistryKeyRecord {
    const HAS_SIZE: bool = false;

    fn file_size(&self) -> Option<u64> {
        None
    }

    fn checked_timestamps(&self) -> Vec<(&'static str, Timestamp)> {
        vec![("last_written", Timestamp::from(self.last_written))]
    }

    fn base_name(&self) -> &str {
        &self.key_name
    }
}

/// Flags unusual sizes, future or malformed timestamps and hidden names
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    size_threshold: f64,
    policy: DuplicatePolicy,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_THRESHOLD, DuplicatePolicy::default())
    }
}

impl AnomalyDetector {
    pub fn new(size_threshold: f64, policy: DuplicatePolicy) -> Self {
        Self {
            size_threshold,
            policy,
        }
    }

    /// Runs every rule against `records` using the current time
    pub fn detect<T: Triageable>(&self, records: &[T]) -> Vec<AnomalyRecord<T>> {
        self.detect_at(records, Utc::now())
    }

    /// Runs every rule against `records` as of `now`
    ///
    /// Sized record kinds need at least two strictly positive file sizes for
    /// the mean and sample deviation; with fewer, nothing is reported.
    pub fn detect_at<T: Triageable>(
        &self,
        records: &[T],
        now: DateTime<Utc>,
    ) -> Vec<AnomalyRecord<T>> {
        let stats = if T::HAS_SIZE {
            let sizes: Vec<f64> = records
                .iter()
                .filter_map(Triageable::file_size)
                .filter(|&s| s > 0)
                .map(|s| s as f64)
                .collect();
            match SizeStats::from_samples(&sizes) {
                Some(stats) => Some(stats),
                None => {
                    debug!(samples = sizes.len(), "Too few file sizes for anomaly statistics");
                    return Vec::new();
                }
            }
        } else {
            None
        };

        let mut anomalies = Vec::new();
        for record in records {
            let reasons = self.reasons(record, stats.as_ref(), now);
            if reasons.is_empty() {
                continue;
            }
            match self.policy {
                DuplicatePolicy::PerRule => anomalies.extend(
                    reasons
                        .into_iter()
                        .map(|reason| AnomalyRecord::new(record.clone(), reason)),
                ),
                DuplicatePolicy::Merge => {
                    anomalies.push(AnomalyRecord::new(record.clone(), reasons.join("; ")))
                }
            }
        }
        anomalies
    }

    fn reasons<T: Triageable>(
        &self,
        record: &T,
        stats: Option<&SizeStats>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut reasons = Vec::new();

        if let (Some(stats), Some(size)) = (stats, record.file_size()) {
            if size > 0 && (size as f64 - stats.mean).abs() > self.size_threshold * stats.stdev {
                reasons.push(format!(
                    "Unusual file size (mean={:.2}, stdev={:.2})",
                    stats.mean, stats.stdev
                ));
            }
        }

        let timestamps = record.checked_timestamps();
        for (field, ts) in &timestamps {
            if ts.is_after(now) {
                reasons.push(format!("Future {field} detected"));
            }
        }

        if record.base_name().starts_with('.') {
            reasons.push(HIDDEN_REASON.to_string());
        }

        if timestamps.iter().any(|(_, ts)| ts.is_invalid()) {
            reasons.push(MALFORMED_TIMESTAMP_REASON.to_string());
        }

        reasons
    }
}

/// Mean and sample standard deviation of file sizes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeStats {
    pub mean: f64,
    pub stdev: f64,
}

impl SizeStats {
    /// Returns `None` for fewer than two samples
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.len() < 2 {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(Self {
            mean,
            stdev: variance.sqrt(),
        })
    }
}
