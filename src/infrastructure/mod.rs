//! Infrastructure layer
//!
//! Concrete implementations of the domain repositories: segmented images,
//! mounted filesystems, the regf hive reader and the output sinks.

pub mod block_device;
pub mod file_systems;
pub mod hive;
pub mod persistence;
