//! Disk image metadata entity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Container format inferred from segment file extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerFormat {
    /// Expert Witness Format, `.E01`, `.E02`, ...
    Ewf,
    /// SMART format, `.s01`, `.s02`, ...
    Smart,
    /// Split raw image, `.001`, `.002`, ... or a single raw file
    Raw,
}

impl ContainerFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ewf => "EWF",
            Self::Smart => "SMART",
            Self::Raw => "RAW",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary of the evidence container's segment files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskImageMetadata {
    /// Directory (or single file) the segments were discovered in
    pub path: String,
    /// Segment file paths, ordered by index
    pub files: Vec<String>,
    /// Sum of segment sizes in bytes
    pub total_size: u64,
    /// Earliest creation time across segments (RFC 3339)
    pub creation_time: Option<String>,
    /// Latest access time across segments (RFC 3339)
    pub access_time: Option<String>,
    /// Latest modification time across segments (RFC 3339)
    pub modification_time: Option<String>,
    pub file_format: ContainerFormat,
    pub segment_count: usize,
}
