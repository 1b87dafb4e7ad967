//! Filesystem probing through the evidence container

use crate::domain::repositories::{BlockDeviceReader, FileSystemType};
use crate::domain::services::EvidenceContainer;
use tracing::{info, warn};

const PROBE_LEN: u64 = 2048;
const NTFS_OEM_ID: &[u8] = b"NTFS    ";
const EXFAT_OEM_ID: &[u8] = b"EXFAT   ";
const FAT32_LABEL: &[u8] = b"FAT32   ";
const FAT32_LABEL_OFFSET: usize = 82;
const EXT_MAGIC_OFFSET: usize = 1024 + 56;
const EXT_MAGIC: [u8; 2] = [0x53, 0xEF];

/// Identifies the filesystem family from its boot region
pub fn probe_filesystem(boot: &[u8]) -> FileSystemType {
    let at = |offset: usize, magic: &[u8]| {
        boot.get(offset..offset + magic.len())
            .is_some_and(|window| window == magic)
    };

    if at(3, NTFS_OEM_ID) {
        FileSystemType::Ntfs
    } else if at(3, EXFAT_OEM_ID) {
        FileSystemType::ExFat
    } else if at(FAT32_LABEL_OFFSET, FAT32_LABEL) {
        FileSystemType::Fat32
    } else if at(EXT_MAGIC_OFFSET, &EXT_MAGIC) {
        FileSystemType::Ext
    } else {
        FileSystemType::Unknown
    }
}

/// Reads the boot region through the container and probes it
pub fn detect_filesystem<D: BlockDeviceReader>(container: &EvidenceContainer<D>) -> FileSystemType {
    let len = container.size().min(PROBE_LEN) as usize;
    match container.read(0, len) {
        Ok(read) => {
            if read.is_degraded() {
                warn!("Boot region partially unreadable; probe may be unreliable");
            }
            let fs_type = probe_filesystem(read.data());
            info!("Detected filesystem: {}", fs_type.name());
            fs_type
        }
        Err(e) => {
            warn!("Filesystem probe failed: {}", e);
            FileSystemType::Unknown
        }
    }
}
