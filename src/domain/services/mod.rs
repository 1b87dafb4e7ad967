//! Domain services
//!
//! Core triage logic that operates on domain entities through the
//! repository traits.

mod anomaly_detector;
mod budget;
mod decode;
mod evidence_container;
mod registry_rules;

pub use anomaly_detector::{
    AnomalyDetector, DEFAULT_SIZE_THRESHOLD, DuplicatePolicy, HIDDEN_REASON,
    MALFORMED_TIMESTAMP_REASON, SizeStats, Triageable,
};
pub use budget::{BudgetScope, ExtractionBudget};
pub use decode::{decode_utf16le_lossy, safe_decode};
pub use evidence_container::{
    BadChunkPolicy, ContainerError, ContainerRead, DEFAULT_CHUNK_SIZE, EvidenceContainer,
};
pub use registry_rules::{DEFAULT_VALUE_NAME, classify_operation, recent_window, render_value};
