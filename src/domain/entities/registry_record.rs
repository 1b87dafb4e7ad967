//! Registry key record entity
//!
//! One record per registry key visited during hive traversal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Type tag written for binary values
pub const REG_BINARY: &str = "REG_BINARY";

/// Heuristic classification of what last happened to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    RecentModification,
    BinaryOperation,
    ExecutableOperation,
    ReadOperation,
    UnknownOperation,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecentModification => "RECENT_MODIFICATION",
            Self::BinaryOperation => "BINARY_OPERATION",
            Self::ExecutableOperation => "EXECUTABLE_OPERATION",
            Self::ReadOperation => "READ_OPERATION",
            Self::UnknownOperation => "UNKNOWN_OPERATION",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded registry value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryValue {
    /// Value type tag, e.g. `REG_SZ`
    #[serde(rename = "type")]
    pub value_type: String,
    /// Rendered value
    pub value: String,
}

impl RegistryValue {
    pub fn new(value_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value_type: value_type.into(),
            value: value.into(),
        }
    }

    pub fn is_binary(&self) -> bool {
        self.value_type == REG_BINARY
    }

    /// Returns true if the rendered value references an executable
    pub fn references_executable(&self) -> bool {
        self.value.to_ascii_lowercase().contains(".exe")
    }
}

/// Metadata extracted from one registry key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryKeyRecord {
    /// Hive identifier, e.g. `SYSTEM` or `NTUSER_alice`
    pub hive: String,
    /// Forward-slash-joined key path, empty for the hive root
    pub path: String,
    pub last_written: Option<DateTime<Utc>>,
    pub values: BTreeMap<String, RegistryValue>,
    pub subkeys: Vec<String>,
    pub key_name: String,
    key_depth: usize,
    pub operation_type: OperationType,
    frequency: u32,
    /// Path of the hive file the key was read from
    pub source_path: String,
}

impl RegistryKeyRecord {
    /// Creates a record; the key depth is derived from `path`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hive: String,
        path: String,
        key_name: String,
        last_written: Option<DateTime<Utc>>,
        values: BTreeMap<String, RegistryValue>,
        subkeys: Vec<String>,
        operation_type: OperationType,
        source_path: String,
    ) -> Self {
        let key_depth = path_depth(&path);
        Self {
            hive,
            path,
            last_written,
            values,
            subkeys,
            key_name,
            key_depth,
            operation_type,
            frequency: 1,
            source_path,
        }
    }

    /// Sets the run-wide occurrence count for this path
    pub(crate) fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn key_depth(&self) -> usize {
        self.key_depth
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn subkey_count(&self) -> usize {
        self.subkeys.len()
    }

    pub fn has_binary(&self) -> bool {
        self.values.values().any(RegistryValue::is_binary)
    }

    pub fn has_executable(&self) -> bool {
        self.values.values().any(RegistryValue::references_executable)
    }

    /// Distinct value types, sorted
    pub fn value_types(&self) -> BTreeSet<&str> {
        self.values.values().map(|v| v.value_type.as_str()).collect()
    }

    /// Distinct value types joined with commas
    pub fn value_types_joined(&self) -> String {
        self.value_types().into_iter().collect::<Vec<_>>().join(",")
    }
}

/// Number of non-empty segments in a `/` or `\` separated path
pub fn path_depth(path: &str) -> usize {
    path.split(['/', '\\']).filter(|s| !s.is_empty()).count()
}
