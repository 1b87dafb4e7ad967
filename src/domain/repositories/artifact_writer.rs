//! Artifact writer trait
//!
//! Defines the interface for copying artifacts out of the evidence into the
//! case output directory.

use super::file_system::{FileSystemError, MountedFilesystem};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when writing artifacts
#[derive(Error, Debug)]
pub enum ArtifactWriteError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Source read failed: {0}")]
    Source(#[from] FileSystemError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Write error: {0}")]
    Other(String),
}

/// Result of copying a single artifact
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// Path inside the evidence filesystem
    pub source_path: String,
    /// Path where the copy was saved
    pub saved_path: PathBuf,
    /// Number of bytes copied
    pub saved_size: u64,
}

/// Trait for writing extracted artifacts to storage
///
/// # Example
///
/// ```ignore
/// let writer = LocalArtifactWriter::new(Path::new("/cases/42"))?;
/// let copy = writer.copy_file(&fs, "/Windows/System32/config/SYSTEM", None, Path::new("SYSTEM.hive"))?;
/// println!("Saved to: {}", copy.saved_path.display());
/// ```
pub trait ArtifactWriter: Send + Sync {
    /// Streams a file out of `fs` into `dest`, relative to the output directory
    ///
    /// Copying stops at `size_hint` bytes when given, and always stops at the
    /// first empty chunk.
    fn copy_file(
        &self,
        fs: &dyn MountedFilesystem,
        source: &str,
        size_hint: Option<u64>,
        dest: &Path,
    ) -> Result<WriteResult, ArtifactWriteError>;

    /// Writes a small text file, relative to the output directory
    fn write_text(&self, dest: &Path, contents: &str) -> Result<PathBuf, ArtifactWriteError>;

    /// Returns the output directory
    fn output_dir(&self) -> &Path;

    /// Returns the number of files written so far
    fn files_written(&self) -> usize;

    /// Returns the total bytes written so far
    fn bytes_written(&self) -> u64;
}
