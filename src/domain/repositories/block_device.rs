//! Block device reader trait
//!
//! Defines the "random read at offset" capability the evidence container is
//! built on. Implementations decide how segments map to the logical stream.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when reading from a block device
#[derive(Error, Debug)]
pub enum BlockDeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Segment not found: {0}")]
    SegmentNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid offset: {offset} exceeds device size {device_size}")]
    InvalidOffset { offset: u64, device_size: u64 },

    #[error("Read error at offset {offset}: {message}")]
    ReadError { offset: u64, message: String },

    #[error("Device error: {0}")]
    Other(String),
}

/// Information about an opened device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Display path (first segment, or the single image file)
    pub path: String,
    /// Total addressable size in bytes
    pub size: u64,
    /// Backing files, ordered by index
    pub segments: Vec<PathBuf>,
    /// Whether the device is read-only
    pub read_only: bool,
}

impl DeviceInfo {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Trait for reading raw data from a logical byte stream
///
/// Reads take `&self` so that one device can be shared across threads;
/// implementations serialize access to their handles internally.
///
/// # Example
///
/// ```ignore
/// let device = SegmentedImage::open(&segments)?;
/// let boot = device.read_at(0, 512)?;
/// ```
pub trait BlockDeviceReader: Send + Sync {
    /// Returns information about the device
    fn device_info(&self) -> DeviceInfo;

    /// Reads up to `length` bytes at the specified byte offset
    ///
    /// A result shorter than `length` means the backing storage ended or
    /// failed early; callers decide how to treat the missing tail.
    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError>;

    /// Returns the device path
    fn path(&self) -> &str;

    /// Returns the total size in bytes
    fn size(&self) -> u64;
}
