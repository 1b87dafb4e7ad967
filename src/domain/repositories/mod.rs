//! Repository traits (interfaces)
//!
//! These traits define the capabilities the triage core consumes. Container
//! decoding, filesystem parsing and hive cell parsing live behind them.

mod artifact_writer;
mod block_device;
mod file_system;
mod hive;

pub use artifact_writer::{ArtifactWriteError, ArtifactWriter, WriteResult};
pub use block_device::{BlockDeviceError, BlockDeviceReader, DeviceInfo};
pub use file_system::{
    DirEntry, FileSystemError, FileSystemType, MountedFilesystem, NodeKind, NodeMetadata,
    join_path,
};
pub use hive::{HiveError, HiveKey, HiveParser, HiveValue, RegistryHive, ValueData, ValueType};
