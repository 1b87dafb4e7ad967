//! Local artifact writer implementation
//!
//! Copies artifacts out of a mounted filesystem into the case output
//! directory, streaming in bounded chunks.

use crate::domain::repositories::{
    ArtifactWriteError, ArtifactWriter, MountedFilesystem, WriteResult,
};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

/// Default copy chunk size (1 MiB)
pub const DEFAULT_COPY_CHUNK: usize = 1024 * 1024;

/// Local file system writer
pub struct LocalArtifactWriter {
    output_dir: PathBuf,
    chunk_size: usize,
    files_written: AtomicUsize,
    bytes_written: AtomicU64,
}

impl LocalArtifactWriter {
    /// Creates a writer, creating the output directory if needed
    pub fn new(output_dir: &Path) -> Result<Self, ArtifactWriteError> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir).map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    ArtifactWriteError::PermissionDenied(output_dir.display().to_string())
                } else {
                    ArtifactWriteError::IoError(e)
                }
            })?;
        }

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            chunk_size: DEFAULT_COPY_CHUNK,
            files_written: AtomicUsize::new(0),
            bytes_written: AtomicU64::new(0),
        })
    }

    /// Sets the copy chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn prepare(&self, dest: &Path) -> Result<PathBuf, ArtifactWriteError> {
        let path = self.output_dir.join(dest);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

impl LocalArtifactWriter {
    /// Streams `source` into `out`; returns the bytes copied
    fn copy_chunks(
        &self,
        fs: &dyn MountedFilesystem,
        source: &str,
        size_hint: Option<u64>,
        out: &mut impl Write,
    ) -> Result<u64, ArtifactWriteError> {
        let mut offset = 0u64;
        while size_hint.is_none_or(|size| offset < size) {
            let want = match size_hint {
                Some(size) => (size - offset).min(self.chunk_size as u64) as usize,
                None => self.chunk_size,
            };
            let chunk = fs.read_file_range(source, offset, want)?;
            if chunk.is_empty() {
                break;
            }
            out.write_all(&chunk)?;
            offset += chunk.len() as u64;
        }
        out.flush()?;
        Ok(offset)
    }
}

impl ArtifactWriter for LocalArtifactWriter {
    fn copy_file(
        &self,
        fs: &dyn MountedFilesystem,
        source: &str,
        size_hint: Option<u64>,
        dest: &Path,
    ) -> Result<WriteResult, ArtifactWriteError> {
        let output_path = self.prepare(dest)?;
        let mut out = BufWriter::new(File::create(&output_path)?);

        let offset = match self.copy_chunks(fs, source, size_hint, &mut out) {
            Ok(offset) => offset,
            Err(e) => {
                // no partial copies in the output
                drop(out);
                if let Err(remove) = std::fs::remove_file(&output_path) {
                    debug!("Cannot remove {}: {}", output_path.display(), remove);
                }
                return Err(e);
            }
        };

        self.files_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(offset, Ordering::Relaxed);
        debug!("Copied {} ({} bytes) to {}", source, offset, output_path.display());

        Ok(WriteResult {
            source_path: source.to_string(),
            saved_path: output_path,
            saved_size: offset,
        })
    }

    fn write_text(&self, dest: &Path, contents: &str) -> Result<PathBuf, ArtifactWriteError> {
        let output_path = self.prepare(dest)?;
        fs::write(&output_path, contents)?;
        self.files_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add(contents.len() as u64, Ordering::Relaxed);
        Ok(output_path)
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn files_written(&self) -> usize {
        self.files_written.load(Ordering::Relaxed)
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}
