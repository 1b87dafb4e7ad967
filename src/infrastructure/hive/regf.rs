//! Read-only regf hive reader
//!
//! Layout:
//! ```text
//! +0x0000  base block, 4096 bytes
//!   +0x00  "regf"
//!   +0x24  root cell offset (u32, relative to hive data)
//!   +0x28  hive data length (u32)
//! +0x1000  hive data: "hbin" blocks holding cells
//!   cell = i32 size (negative when allocated) | payload
//!   payload starts with a two byte signature: nk, vk, lf, lh, li, ri
//! ```
//! Every offset read from the file is bounds checked; a bad cell becomes a
//! [`HiveError::Malformed`] for that key, value or subkey only.

use crate::domain::repositories::{
    HiveError, HiveKey, HiveParser, HiveValue, RegistryHive, ValueData, ValueType,
};
use crate::domain::services::decode_utf16le_lossy;
use chrono::{DateTime, Utc};
use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;
use tracing::debug;

pub const REGF_SIGNATURE: &[u8; 4] = b"regf";
pub const BASE_BLOCK_SIZE: usize = 4096;

const ROOT_CELL_OFFSET: usize = 0x24;
const NO_CELL: u32 = 0xFFFF_FFFF;

const NK_SIGNATURE: &[u8; 2] = b"nk";
const VK_SIGNATURE: &[u8; 2] = b"vk";
const LF_SIGNATURE: &[u8; 2] = b"lf";
const LH_SIGNATURE: &[u8; 2] = b"lh";
const LI_SIGNATURE: &[u8; 2] = b"li";
const RI_SIGNATURE: &[u8; 2] = b"ri";

// nk offsets, relative to the signature
const NK_FLAGS: usize = 2;
const NK_TIMESTAMP: usize = 4;
const NK_SUBKEY_COUNT: usize = 20;
const NK_SUBKEY_LIST: usize = 28;
const NK_VALUE_COUNT: usize = 36;
const NK_VALUE_LIST: usize = 40;
const NK_NAME_LENGTH: usize = 72;
const NK_NAME_START: usize = 76;
const KEY_COMP_NAME: u16 = 0x0020;

// vk offsets, relative to the signature
const VK_NAME_LENGTH: usize = 2;
const VK_DATA_LENGTH: usize = 4;
const VK_DATA_OFFSET: usize = 8;
const VK_TYPE: usize = 12;
const VK_FLAGS: usize = 16;
const VK_NAME_START: usize = 20;
const VALUE_COMP_NAME: u16 = 0x0001;
const DATA_INLINE: u32 = 0x8000_0000;

/// Counts beyond this are treated as corruption
const MAX_LIST_ENTRIES: usize = 65_535;

/// Seconds between 1601-01-01 and 1970-01-01
const FILETIME_EPOCH_DELTA: i64 = 11_644_473_600;

/// Converts a Windows FILETIME to UTC; zero means "never"
pub fn filetime_to_utc(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let secs = (filetime / 10_000_000) as i64 - FILETIME_EPOCH_DELTA;
    let nanos = ((filetime % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

enum HiveBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for HiveBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            HiveBytes::Mapped(m) => m,
            HiveBytes::Owned(v) => v,
        }
    }
}

struct KeyNode {
    name: String,
    timestamp: u64,
    subkey_count: u32,
    subkey_list: u32,
    value_count: u32,
    value_list: u32,
}

/// Opened regf hive
///
/// # Example
///
/// ```ignore
/// let hive = RegfHive::open(Path::new("out/SOFTWARE.hive"))?;
/// let run = hive.open_key(r"Microsoft\Windows\CurrentVersion\Run")?;
/// ```
pub struct RegfHive {
    data: HiveBytes,
    root_cell: u32,
}

impl RegfHive {
    /// Memory-maps a hive file
    pub fn open(path: &Path) -> Result<Self, HiveError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < BASE_BLOCK_SIZE as u64 {
            return Err(HiveError::TooSmall { size: len });
        }
        // the copy is private to this run and never modified while mapped
        let mmap = unsafe { Mmap::map(&file) }?;
        Self::from_data(HiveBytes::Mapped(mmap), &path.display().to_string())
    }

    /// Parses a hive held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, HiveError> {
        Self::from_data(HiveBytes::Owned(bytes), "<memory>")
    }

    fn from_data(data: HiveBytes, label: &str) -> Result<Self, HiveError> {
        if data.len() < BASE_BLOCK_SIZE {
            return Err(HiveError::TooSmall {
                size: data.len() as u64,
            });
        }
        if &data[..4] != REGF_SIGNATURE {
            return Err(HiveError::InvalidSignature(label.to_string()));
        }
        let root_cell = u32::from_le_bytes([
            data[ROOT_CELL_OFFSET],
            data[ROOT_CELL_OFFSET + 1],
            data[ROOT_CELL_OFFSET + 2],
            data[ROOT_CELL_OFFSET + 3],
        ]);
        let hive = Self { data, root_cell };
        hive.key_node(root_cell)?;
        debug!("Opened hive {} (root cell {:#x})", label, root_cell);
        Ok(hive)
    }

    /// Returns the payload of the cell at `offset`
    fn cell(&self, offset: u32) -> Result<&[u8], HiveError> {
        let malformed = |message: &str| HiveError::Malformed {
            offset,
            message: message.to_string(),
        };
        let start = BASE_BLOCK_SIZE
            .checked_add(offset as usize)
            .ok_or_else(|| malformed("offset overflow"))?;
        let size_bytes = self
            .data
            .get(start..start + 4)
            .ok_or_else(|| malformed("cell outside hive"))?;
        let size = i32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
            .unsigned_abs() as usize;
        if size < 8 {
            return Err(malformed("cell too small"));
        }
        self.data
            .get(start + 4..start + size)
            .ok_or_else(|| malformed("cell extends past end of hive"))
    }

    fn key_node(&self, offset: u32) -> Result<KeyNode, HiveError> {
        let nk = self.cell(offset)?;
        let reader = CellReader { bytes: nk, offset };
        if reader.slice(0, 2)? != NK_SIGNATURE {
            return Err(reader.malformed("expected nk signature"));
        }

        let flags = reader.u16(NK_FLAGS)?;
        let name_len = reader.u16(NK_NAME_LENGTH)? as usize;
        let name_bytes = reader.slice(NK_NAME_START, name_len)?;
        let name = if flags & KEY_COMP_NAME != 0 {
            latin1(name_bytes)
        } else {
            decode_utf16le_lossy(name_bytes)
        };

        Ok(KeyNode {
            name,
            timestamp: reader.u64(NK_TIMESTAMP)?,
            subkey_count: reader.u32(NK_SUBKEY_COUNT)?,
            subkey_list: reader.u32(NK_SUBKEY_LIST)?,
            value_count: reader.u32(NK_VALUE_COUNT)?,
            value_list: reader.u32(NK_VALUE_LIST)?,
        })
    }

    /// Child key offsets of a subkey list cell
    fn subkey_offsets(&self, list: u32, allow_index_root: bool) -> Result<Vec<u32>, HiveError> {
        let cell = self.cell(list)?;
        let reader = CellReader {
            bytes: cell,
            offset: list,
        };
        let sig = reader.slice(0, 2)?;
        let count = reader.u16(2)? as usize;

        let stride = match sig {
            s if s == LF_SIGNATURE || s == LH_SIGNATURE => 8,
            s if s == LI_SIGNATURE || s == RI_SIGNATURE => 4,
            _ => return Err(reader.malformed("unknown subkey list signature")),
        };
        let entries = (0..count)
            .map(|i| reader.u32(4 + i * stride))
            .collect::<Result<Vec<_>, _>>()?;

        if sig != RI_SIGNATURE {
            return Ok(entries);
        }
        if !allow_index_root {
            return Err(reader.malformed("nested index root"));
        }
        let mut offsets = Vec::new();
        for sublist in entries {
            match self.subkey_offsets(sublist, false) {
                Ok(found) => offsets.extend(found),
                Err(e) => debug!("Skipping bad subkey sub-list: {}", e),
            }
        }
        Ok(offsets)
    }

    fn subkeys(&self, key: &KeyNode) -> Result<Vec<Result<(String, u32), HiveError>>, HiveError> {
        if key.subkey_count == 0 || key.subkey_list == NO_CELL {
            return Ok(Vec::new());
        }
        let offsets = self.subkey_offsets(key.subkey_list, true)?;
        Ok(offsets
            .into_iter()
            .take(MAX_LIST_ENTRIES)
            .map(|off| self.key_node(off).map(|k| (k.name, off)))
            .collect())
    }

    fn values(&self, key: &KeyNode) -> Result<Vec<Result<HiveValue, HiveError>>, HiveError> {
        if key.value_count == 0 || key.value_list == NO_CELL {
            return Ok(Vec::new());
        }
        let count = key.value_count as usize;
        if count > MAX_LIST_ENTRIES {
            return Err(HiveError::Malformed {
                offset: key.value_list,
                message: format!("value count {count} is unreasonably large"),
            });
        }
        let list = CellReader {
            bytes: self.cell(key.value_list)?,
            offset: key.value_list,
        };
        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            let value = list.u32(i * 4).and_then(|off| self.value(off));
            values.push(value);
        }
        Ok(values)
    }

    fn value(&self, offset: u32) -> Result<HiveValue, HiveError> {
        let reader = CellReader {
            bytes: self.cell(offset)?,
            offset,
        };
        if reader.slice(0, 2)? != VK_SIGNATURE {
            return Err(reader.malformed("expected vk signature"));
        }

        let name_len = reader.u16(VK_NAME_LENGTH)? as usize;
        let raw_len = reader.u32(VK_DATA_LENGTH)?;
        let data_offset = reader.u32(VK_DATA_OFFSET)?;
        let raw_type = reader.u32(VK_TYPE)?;
        let flags = reader.u16(VK_FLAGS)?;

        let name_bytes = reader.slice(VK_NAME_START, name_len)?;
        let name = if flags & VALUE_COMP_NAME != 0 {
            latin1(name_bytes)
        } else {
            decode_utf16le_lossy(name_bytes)
        };

        let len = (raw_len & !DATA_INLINE) as usize;
        let raw = if len == 0 {
            Vec::new()
        } else if raw_len & DATA_INLINE != 0 {
            data_offset.to_le_bytes()[..len.min(4)].to_vec()
        } else {
            let cell = self.cell(data_offset)?;
            cell.get(..len)
                .ok_or_else(|| HiveError::Unsupported(format!(
                    "value data of {len} bytes at {data_offset:#x} (big data or truncated)"
                )))?
                .to_vec()
        };

        let value_type = ValueType::from_raw(raw_type);
        Ok(HiveValue {
            name,
            value_type,
            data: decode_data(value_type, raw),
        })
    }

    fn find_child(&self, key: &KeyNode, name: &str) -> Result<Option<KeyNode>, HiveError> {
        for child in self.subkeys(key)? {
            match child {
                Ok((child_name, off)) if child_name.eq_ignore_ascii_case(name) => {
                    return self.key_node(off).map(Some);
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping unreadable subkey: {}", e),
            }
        }
        Ok(None)
    }
}

fn decode_data(value_type: ValueType, raw: Vec<u8>) -> ValueData {
    match value_type {
        ValueType::Sz | ValueType::ExpandSz | ValueType::Link => ValueData::Text(raw),
        ValueType::MultiSz => ValueData::MultiText(
            decode_utf16le_lossy(&raw)
                .split('\0')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        ValueType::Dword if raw.len() == 4 => {
            ValueData::Dword(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }
        ValueType::DwordBigEndian if raw.len() == 4 => {
            ValueData::Dword(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }
        ValueType::Qword if raw.len() == 8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&raw);
            ValueData::Qword(u64::from_le_bytes(bytes))
        }
        _ => ValueData::Bytes(raw),
    }
}

/// Bounds-checked little-endian reads inside one cell
struct CellReader<'a> {
    bytes: &'a [u8],
    offset: u32,
}

impl<'a> CellReader<'a> {
    fn malformed(&self, message: &str) -> HiveError {
        HiveError::Malformed {
            offset: self.offset,
            message: message.to_string(),
        }
    }

    fn slice(&self, at: usize, len: usize) -> Result<&'a [u8], HiveError> {
        self.bytes
            .get(at..at + len)
            .ok_or_else(|| self.malformed("field outside cell"))
    }

    fn u16(&self, at: usize) -> Result<u16, HiveError> {
        let b = self.slice(at, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&self, at: usize) -> Result<u32, HiveError> {
        let b = self.slice(at, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&self, at: usize) -> Result<u64, HiveError> {
        let b = self.slice(at, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }
}

impl RegistryHive for RegfHive {
    fn open_key(&self, path: &str) -> Result<HiveKey, HiveError> {
        let mut current = self.key_node(self.root_cell)?;
        for component in path.split('\\').filter(|c| !c.is_empty()) {
            current = self
                .find_child(&current, component)?
                .ok_or_else(|| HiveError::KeyNotFound(path.to_string()))?;
        }

        let values = self.values(&current).unwrap_or_else(|e| vec![Err(e)]);
        let subkeys = self
            .subkeys(&current)
            .unwrap_or_else(|e| vec![Err(e)])
            .into_iter()
            .map(|s| s.map(|(name, _)| name))
            .collect();

        Ok(HiveKey {
            name: current.name,
            last_written: filetime_to_utc(current.timestamp),
            values,
            subkeys,
        })
    }
}

/// Opens hive files as [`RegfHive`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RegfParser;

impl HiveParser for RegfParser {
    fn open(&self, path: &Path) -> Result<Box<dyn RegistryHive>, HiveError> {
        Ok(Box::new(RegfHive::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filetime_conversion() {
        // 2020-01-01T00:00:00Z
        let ft = (1_577_836_800 + FILETIME_EPOCH_DELTA) as u64 * 10_000_000;
        let dt = filetime_to_utc(ft).unwrap();
        assert_eq!(dt.to_rfc3339(), "2020-01-01T00:00:00+00:00");
        assert!(filetime_to_utc(0).is_none());
    }

    #[test]
    fn test_rejects_non_regf() {
        let mut bytes = vec![0u8; BASE_BLOCK_SIZE * 2];
        bytes[..4].copy_from_slice(b"junk");
        assert!(matches!(
            RegfHive::from_bytes(bytes),
            Err(HiveError::InvalidSignature(_))
        ));
        assert!(matches!(
            RegfHive::from_bytes(b"regf".to_vec()),
            Err(HiveError::TooSmall { .. })
        ));
    }

    #[test]
    fn test_decode_data_by_type() {
        assert_eq!(
            decode_data(ValueType::Dword, vec![2, 0, 0, 0]),
            ValueData::Dword(2)
        );
        assert_eq!(
            decode_data(ValueType::DwordBigEndian, vec![0, 0, 0, 2]),
            ValueData::Dword(2)
        );
        assert_eq!(
            decode_data(ValueType::Dword, vec![1, 2]),
            ValueData::Bytes(vec![1, 2])
        );
        let multi: Vec<u8> = "a\0bc\0\0".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(
            decode_data(ValueType::MultiSz, multi),
            ValueData::MultiText(vec!["a".into(), "bc".into()])
        );
    }
}
