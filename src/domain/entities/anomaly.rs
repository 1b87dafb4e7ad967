//! Anomaly record entity

use serde::{Deserialize, Serialize};

/// A record flagged by the anomaly detector together with the reason
///
/// The wrapped record is flattened into the JSON object so that an anomaly
/// looks like the original entry with one extra `anomaly_reason` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord<T> {
    #[serde(flatten)]
    pub record: T,
    pub anomaly_reason: String,
}

impl<T> AnomalyRecord<T> {
    pub fn new(record: T, anomaly_reason: impl Into<String>) -> Self {
        Self {
            record,
            anomaly_reason: anomaly_reason.into(),
        }
    }
}
