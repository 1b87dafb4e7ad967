//! Filesystem entry entity
//!
//! One record per filesystem object visited by the artifact walker.

use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of filesystem object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    File,
    Directory,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "File"),
            Self::Directory => write!(f, "Directory"),
        }
    }
}

/// Metadata of a single file or directory found inside the evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemEntry {
    /// Absolute path, parent path joined with the decoded name
    pub path: String,
    /// Size in bytes, never negative
    pub size: u64,
    pub created_time: Timestamp,
    pub modified_time: Timestamp,
    pub accessed_time: Timestamp,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

impl FilesystemEntry {
    /// Creates an entry from raw filesystem values
    ///
    /// Negative raw sizes are normalized to zero.
    pub fn new(
        path: String,
        raw_size: i64,
        created: Timestamp,
        modified: Timestamp,
        accessed: Timestamp,
        entry_type: EntryType,
    ) -> Self {
        Self {
            path,
            size: raw_size.max(0) as u64,
            created_time: created,
            modified_time: modified,
            accessed_time: accessed,
            entry_type,
        }
    }

    /// Returns the last path component
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }
}
