//! Segmented image block device
//!
//! Concatenates ordered segment files (`image.001`, `image.002`, ... or a
//! single raw file) into one logical byte stream.
//!
//! A later segment that cannot be opened keeps its slot: its range fails to
//! read, so the container zero-fills it and later segments stay at their
//! offsets. A later segment that cannot even be stat'ed ends the stream.

use crate::domain::repositories::{BlockDeviceError, BlockDeviceReader, DeviceInfo};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

struct Segment {
    path: PathBuf,
    start: u64,
    len: u64,
    /// `None` when the segment could not be opened
    file: Option<Mutex<File>>,
}

/// Block device backed by an ordered list of segment files
///
/// Each segment handle sits behind its own lock so reads from several
/// threads only contend when they touch the same segment.
///
/// # Example
///
/// ```ignore
/// let device = SegmentedImage::open(&[PathBuf::from("disk.001"), PathBuf::from("disk.002")])?;
/// let data = device.read_at(0, 512)?;
/// ```
pub struct SegmentedImage {
    segments: Vec<Segment>,
    path: String,
    size: u64,
}

impl SegmentedImage {
    /// Opens every segment in the given order
    pub fn open(paths: &[PathBuf]) -> Result<Self, BlockDeviceError> {
        let first = paths
            .first()
            .ok_or_else(|| BlockDeviceError::Other("no segments given".to_string()))?;

        let mut segments = Vec::with_capacity(paths.len());
        let mut start = 0u64;
        for (index, path) in paths.iter().enumerate() {
            let (file, len) = match Self::open_segment(path) {
                Ok(file) => {
                    let len = file.metadata()?.len();
                    (Some(Mutex::new(file)), len)
                }
                Err(e) if index == 0 => return Err(e),
                Err(e) => match fs::metadata(path) {
                    Ok(meta) => {
                        warn!(
                            "Segment {} unreadable ({}); its {} bytes will read as bad chunks",
                            path.display(),
                            e,
                            meta.len()
                        );
                        (None, meta.len())
                    }
                    Err(stat) => {
                        warn!(
                            "Segment {} cannot be stat'ed ({}); container truncated at {} bytes",
                            path.display(),
                            stat,
                            start
                        );
                        break;
                    }
                },
            };
            debug!("Segment {} at offset {} ({} bytes)", path.display(), start, len);
            segments.push(Segment {
                path: path.clone(),
                start,
                len,
                file,
            });
            start += len;
        }

        Ok(Self {
            segments,
            path: first.display().to_string(),
            size: start,
        })
    }

    fn open_segment(path: &Path) -> Result<File, BlockDeviceError> {
        if !path.exists() {
            return Err(BlockDeviceError::SegmentNotFound(path.display().to_string()));
        }
        OpenOptions::new().read(true).open(path).map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                BlockDeviceError::PermissionDenied(path.display().to_string())
            } else {
                BlockDeviceError::IoError(e)
            }
        })
    }

    /// Index of the segment containing `offset`
    fn segment_index(&self, offset: u64) -> Option<usize> {
        let idx = self.segments.partition_point(|s| s.start + s.len <= offset);
        (idx < self.segments.len()).then_some(idx)
    }

    /// Segment file paths in order
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.segments.iter().map(|s| s.path.clone()).collect()
    }
}

impl BlockDeviceReader for SegmentedImage {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            path: self.path.clone(),
            size: self.size,
            segments: self.segment_paths(),
            read_only: true,
        }
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        if offset >= self.size {
            return Err(BlockDeviceError::InvalidOffset {
                offset,
                device_size: self.size,
            });
        }

        let to_read = length.min((self.size - offset) as usize);
        let mut out = vec![0u8; to_read];
        let mut filled = 0usize;
        let mut cursor = offset;

        while filled < to_read {
            let Some(idx) = self.segment_index(cursor) else {
                break;
            };
            let segment = &self.segments[idx];
            let within = cursor - segment.start;
            let take = ((segment.len - within) as usize).min(to_read - filled);

            let read = match &segment.file {
                Some(handle) => {
                    let mut file = handle.lock();
                    file.seek(SeekFrom::Start(within))
                        .and_then(|_| read_full(&mut file, &mut out[filled..filled + take]))
                        .map_err(|e| e.to_string())
                }
                None => Err("segment unreadable".to_string()),
            };
            let got = match read {
                Ok(got) => got,
                // hand back what was read; the caller degrades the rest
                Err(_) if filled > 0 => break,
                Err(message) => {
                    return Err(BlockDeviceError::ReadError {
                        offset: cursor,
                        message: format!("{}: {}", segment.path.display(), message),
                    });
                }
            };

            filled += got;
            cursor += got as u64;
            if got < take {
                // segment shrank underneath us
                break;
            }
        }

        out.truncate(filled);
        Ok(out)
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Reads until `buf` is full or the file ends
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
