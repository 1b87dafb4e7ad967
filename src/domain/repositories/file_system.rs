//! Mounted filesystem trait
//!
//! The core never parses on-disk filesystem structures itself. It consumes a
//! filesystem that external tooling already mounted from the container,
//! through three operations: open a path, list a directory, read a range.

use thiserror::Error;

/// Filesystem families recognised when probing a container's boot region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileSystemType {
    /// Linux ext2/3/4 (shared superblock magic)
    Ext,
    /// Windows NTFS filesystem
    Ntfs,
    /// Windows FAT32 filesystem
    Fat32,
    /// Windows exFAT filesystem
    ExFat,
    /// Nothing recognised
    Unknown,
}

impl FileSystemType {
    /// Returns a human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            FileSystemType::Ext => "ext2/3/4",
            FileSystemType::Ntfs => "NTFS",
            FileSystemType::Fat32 => "FAT32",
            FileSystemType::ExFat => "exFAT",
            FileSystemType::Unknown => "unknown",
        }
    }
}

/// Errors that can occur when accessing a mounted filesystem
#[derive(Error, Debug)]
pub enum FileSystemError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Refusing to follow symlink: {0}")]
    Symlink(String),

    #[error("Read error on {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Filesystem cannot be mounted: {0}")]
    MountFailed(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Kind of a filesystem node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Raw metadata as reported by the filesystem
///
/// Every field may be missing; timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMetadata {
    pub kind: NodeKind,
    pub size: Option<i64>,
    pub created: Option<i64>,
    pub modified: Option<i64>,
    pub accessed: Option<i64>,
}

impl NodeMetadata {
    pub fn file(size: i64) -> Self {
        Self {
            kind: NodeKind::File,
            size: Some(size),
            created: None,
            modified: None,
            accessed: None,
        }
    }

    pub fn directory(size: i64) -> Self {
        Self {
            kind: NodeKind::Directory,
            ..Self::file(size)
        }
    }

    pub fn with_times(
        mut self,
        created: Option<i64>,
        modified: Option<i64>,
        accessed: Option<i64>,
    ) -> Self {
        self.created = created;
        self.modified = modified;
        self.accessed = accessed;
        self
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// One directory listing entry
///
/// Names are raw bytes; decoding is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: Vec<u8>,
    /// `None` when the filesystem has no metadata record for the entry
    pub metadata: Option<NodeMetadata>,
}

impl DirEntry {
    pub fn new(name: impl Into<Vec<u8>>, metadata: Option<NodeMetadata>) -> Self {
        Self {
            name: name.into(),
            metadata,
        }
    }

    /// Returns true for the `.` and `..` pseudo entries
    pub fn is_dot(&self) -> bool {
        self.name == b"." || self.name == b".."
    }
}

/// Trait for a filesystem mounted from the evidence container
///
/// Paths are `/`-separated and relative to the filesystem root; a leading
/// `/` is accepted.
pub trait MountedFilesystem: Send + Sync {
    /// Looks up a path and returns its metadata
    fn open_path(&self, path: &str) -> Result<NodeMetadata, FileSystemError>;

    /// Lists the entries of a directory
    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FileSystemError>;

    /// Reads up to `length` bytes of a file starting at `offset`
    ///
    /// An empty result means end of file.
    fn read_file_range(
        &self,
        path: &str,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, FileSystemError>;
}

/// Joins a parent path and a child name with a single `/`
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        format!("/{name}")
    } else if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}
