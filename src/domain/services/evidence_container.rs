//! Evidence container
//!
//! Presents a block device as one addressable byte stream with fault-tolerant
//! chunked reads. Bad chunks degrade a read to zeros instead of failing it,
//! and the zeroed ranges travel with the data.

use crate::domain::repositories::{BlockDeviceError, BlockDeviceReader, DeviceInfo};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default read chunk size (32 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Errors surfaced by the evidence container
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("No segment files found in {0}")]
    NoSegments(PathBuf),

    #[error("Cannot open container segment {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: BlockDeviceError,
    },

    #[error("Read of {size} bytes at offset {offset} exceeds container size {container_size}")]
    Read {
        offset: u64,
        size: usize,
        container_size: u64,
    },
}

/// What to do when a chunk cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadChunkPolicy {
    /// Zero-fill everything from the failure to the end of the request
    #[default]
    ZeroFillRemainder,
    /// Zero-fill only the failing chunk and continue with the next one
    SkipBadChunk,
}

/// Data returned by [`EvidenceContainer::read`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRead {
    data: Vec<u8>,
    zero_filled: Vec<Range<u64>>,
}

impl ContainerRead {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Absolute container ranges that were substituted with zeros
    pub fn zero_filled(&self) -> &[Range<u64>] {
        &self.zero_filled
    }

    pub fn is_degraded(&self) -> bool {
        !self.zero_filled.is_empty()
    }

    pub fn zero_filled_bytes(&self) -> u64 {
        self.zero_filled.iter().map(|r| r.end - r.start).sum()
    }
}

/// Random-access view over an evidence container
///
/// Dropping the container releases the underlying handles; [`close`]
/// does the same explicitly and logs it.
///
/// [`close`]: EvidenceContainer::close
pub struct EvidenceContainer<D: BlockDeviceReader> {
    device: D,
    chunk_size: usize,
    policy: BadChunkPolicy,
    bad_chunks: Mutex<Vec<u64>>,
}

impl<D: BlockDeviceReader> EvidenceContainer<D> {
    /// Wraps an already opened device
    pub fn from_device(device: D) -> Self {
        let info = device.device_info();
        info!(
            path = %info.path,
            size = info.size,
            segments = info.segment_count(),
            "Opened evidence container"
        );
        Self {
            device,
            chunk_size: DEFAULT_CHUNK_SIZE,
            policy: BadChunkPolicy::default(),
            bad_chunks: Mutex::new(Vec::new()),
        }
    }

    /// Sets the chunk size used for reads
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets the bad-chunk policy
    pub fn with_policy(mut self, policy: BadChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Total addressable size in bytes
    pub fn size(&self) -> u64 {
        self.device.size()
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.device.device_info()
    }

    /// Offsets of chunks that failed to read so far
    pub fn bad_chunks(&self) -> Vec<u64> {
        self.bad_chunks.lock().clone()
    }

    /// Reads exactly `size` bytes at `offset`
    ///
    /// Fails only when the range does not fit in the container. I/O failures
    /// and short reads inside the range are zero-filled according to the
    /// bad-chunk policy.
    pub fn read(&self, offset: u64, size: usize) -> Result<ContainerRead, ContainerError> {
        let container_size = self.size();
        let end = offset
            .checked_add(size as u64)
            .filter(|&end| end <= container_size)
            .ok_or(ContainerError::Read {
                offset,
                size,
                container_size,
            })?;

        let mut data = Vec::with_capacity(size);
        let mut zero_filled: Vec<Range<u64>> = Vec::new();
        let mut cursor = offset;

        while cursor < end {
            let want = (end - cursor).min(self.chunk_size as u64) as usize;
            let chunk = match self.device.read_at(cursor, want) {
                Ok(mut chunk) => {
                    chunk.truncate(want);
                    chunk
                }
                Err(e) => {
                    warn!("Chunk read failed at offset {}: {}", cursor, e);
                    Vec::new()
                }
            };

            let got = chunk.len();
            data.extend_from_slice(&chunk);
            if got == want {
                cursor += want as u64;
                continue;
            }

            let fault = cursor + got as u64;
            self.bad_chunks.lock().push(cursor);
            let fill_end = match self.policy {
                BadChunkPolicy::ZeroFillRemainder => end,
                BadChunkPolicy::SkipBadChunk => cursor + want as u64,
            };
            debug!("Zero-filling {} bytes at offset {}", fill_end - fault, fault);
            data.resize(data.len() + (fill_end - fault) as usize, 0);
            push_range(&mut zero_filled, fault..fill_end);
            cursor = fill_end;
        }

        Ok(ContainerRead { data, zero_filled })
    }

    /// Releases the container
    pub fn close(self) {
        let bad = self.bad_chunks.lock().len();
        info!(
            path = self.device.path(),
            bad_chunks = bad,
            "Closed evidence container"
        );
    }
}

/// Appends a range, merging it with the previous one when adjacent
fn push_range(ranges: &mut Vec<Range<u64>>, range: Range<u64>) {
    if let Some(last) = ranges.last_mut() {
        if last.end == range.start {
            last.end = range.end;
            return;
        }
    }
    ranges.push(range);
}
