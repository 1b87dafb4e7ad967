//! Mounted filesystem implementations

mod host_mount;
mod memory;

pub use host_mount::HostMount;
pub use memory::MemoryFilesystem;
