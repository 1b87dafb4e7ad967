//! Domain entities
//!
//! Core objects of the triage domain: filesystem entries, registry key
//! records, anomalies and the evidence container summary.

mod anomaly;
mod filesystem_entry;
mod image_metadata;
mod registry_record;
mod target_paths;
mod timestamp;

pub use anomaly::AnomalyRecord;
pub use filesystem_entry::{EntryType, FilesystemEntry};
pub use image_metadata::{ContainerFormat, DiskImageMetadata};
pub use registry_record::{OperationType, REG_BINARY, RegistryKeyRecord, RegistryValue, path_depth};
pub use target_paths::{HiveTargets, NTUSER, TargetPathTable, UserHiveTargets};
pub use timestamp::{INVALID_TIMESTAMP, NOT_AVAILABLE, TIMESTAMP_FORMAT, Timestamp};
