//! Shared test helpers
//!
//! Builds minimal but well-formed regf hives in memory so registry tests can
//! run against the real reader.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

pub const REG_SZ: u32 = 1;
pub const REG_BINARY: u32 = 3;
pub const REG_DWORD: u32 = 4;

const BASE_BLOCK: usize = 4096;
const HBIN_HEADER: usize = 32;
const NO_CELL: u32 = 0xFFFF_FFFF;
const FILETIME_EPOCH_DELTA: i64 = 11_644_473_600;

/// Converts a UTC instant to a Windows FILETIME
pub fn filetime(at: DateTime<Utc>) -> u64 {
    ((at.timestamp() + FILETIME_EPOCH_DELTA) as u64) * 10_000_000
}

/// UTF-16LE with a terminating NUL, as registry strings are stored
pub fn utf16z(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

#[derive(Debug, Clone)]
pub struct ValueSpec {
    pub name: String,
    pub value_type: u32,
    pub data: Vec<u8>,
}

impl ValueSpec {
    pub fn string(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            value_type: REG_SZ,
            data: utf16z(text),
        }
    }

    pub fn dword(name: &str, value: u32) -> Self {
        Self {
            name: name.to_string(),
            value_type: REG_DWORD,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn binary(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            value_type: REG_BINARY,
            data: data.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeySpec {
    pub name: String,
    pub last_written: u64,
    pub values: Vec<ValueSpec>,
    pub children: Vec<KeySpec>,
}

impl KeySpec {
    pub fn new(name: &str, last_written: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            last_written: filetime(last_written),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn value(mut self, value: ValueSpec) -> Self {
        self.values.push(value);
        self
    }

    pub fn child(mut self, child: KeySpec) -> Self {
        self.children.push(child);
        self
    }

    /// Adds a chain of nested keys, e.g. `["Microsoft", "Windows"]`
    pub fn path(self, names: &[&str], leaf: KeySpec) -> Self {
        match names.split_first() {
            None => self.child(leaf),
            Some((first, rest)) => {
                let inner = KeySpec {
                    name: first.to_string(),
                    last_written: self.last_written,
                    values: Vec::new(),
                    children: Vec::new(),
                };
                self.child(inner.path(rest, leaf))
            }
        }
    }
}

/// Hive data area under construction
struct HiveData {
    bytes: Vec<u8>,
}

impl HiveData {
    fn new() -> Self {
        let mut bytes = vec![0u8; HBIN_HEADER];
        bytes[..4].copy_from_slice(b"hbin");
        Self { bytes }
    }

    /// Appends an allocated cell and returns its offset
    fn alloc(&mut self, payload: &[u8]) -> u32 {
        let offset = self.bytes.len() as u32;
        let size = (4 + payload.len()).div_ceil(8) * 8;
        self.bytes
            .extend_from_slice(&(-(size as i32)).to_le_bytes());
        self.bytes.extend_from_slice(payload);
        self.bytes.resize(offset as usize + size, 0);
        offset
    }

    fn value(&mut self, spec: &ValueSpec) -> u32 {
        let (length, data_offset) = if spec.data.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..spec.data.len()].copy_from_slice(&spec.data);
            (
                spec.data.len() as u32 | 0x8000_0000,
                u32::from_le_bytes(inline),
            )
        } else {
            (spec.data.len() as u32, self.alloc(&spec.data))
        };

        let mut vk = vec![0u8; 20];
        vk[..2].copy_from_slice(b"vk");
        vk[2..4].copy_from_slice(&(spec.name.len() as u16).to_le_bytes());
        vk[4..8].copy_from_slice(&length.to_le_bytes());
        vk[8..12].copy_from_slice(&data_offset.to_le_bytes());
        vk[12..16].copy_from_slice(&spec.value_type.to_le_bytes());
        vk[16..18].copy_from_slice(&1u16.to_le_bytes());
        vk.extend_from_slice(spec.name.as_bytes());
        self.alloc(&vk)
    }

    fn key(&mut self, spec: &KeySpec) -> u32 {
        let children: Vec<u32> = spec.children.iter().map(|c| self.key(c)).collect();
        let subkey_list = if children.is_empty() {
            NO_CELL
        } else {
            let mut lf = Vec::new();
            lf.extend_from_slice(b"lf");
            lf.extend_from_slice(&(children.len() as u16).to_le_bytes());
            for (offset, child) in children.iter().zip(&spec.children) {
                lf.extend_from_slice(&offset.to_le_bytes());
                let mut hint = [0u8; 4];
                for (slot, b) in hint.iter_mut().zip(child.name.bytes()) {
                    *slot = b;
                }
                lf.extend_from_slice(&hint);
            }
            self.alloc(&lf)
        };

        let values: Vec<u32> = spec.values.iter().map(|v| self.value(v)).collect();
        let value_list = if values.is_empty() {
            NO_CELL
        } else {
            let list: Vec<u8> = values.iter().flat_map(|o| o.to_le_bytes()).collect();
            self.alloc(&list)
        };

        let mut nk = vec![0u8; 76];
        nk[..2].copy_from_slice(b"nk");
        nk[2..4].copy_from_slice(&0x20u16.to_le_bytes());
        nk[4..12].copy_from_slice(&spec.last_written.to_le_bytes());
        nk[16..20].copy_from_slice(&NO_CELL.to_le_bytes());
        nk[20..24].copy_from_slice(&(children.len() as u32).to_le_bytes());
        nk[28..32].copy_from_slice(&subkey_list.to_le_bytes());
        nk[32..36].copy_from_slice(&NO_CELL.to_le_bytes());
        nk[36..40].copy_from_slice(&(values.len() as u32).to_le_bytes());
        nk[40..44].copy_from_slice(&value_list.to_le_bytes());
        nk[72..74].copy_from_slice(&(spec.name.len() as u16).to_le_bytes());
        nk.extend_from_slice(spec.name.as_bytes());
        self.alloc(&nk)
    }
}

/// Serializes a key tree into a complete hive file image
pub fn build_hive(root: &KeySpec) -> Vec<u8> {
    let mut data = HiveData::new();
    let root_offset = data.key(root);
    let data_len = data.bytes.len().div_ceil(BASE_BLOCK) * BASE_BLOCK;
    data.bytes.resize(data_len, 0);

    let mut hive = vec![0u8; BASE_BLOCK];
    hive[..4].copy_from_slice(b"regf");
    hive[0x24..0x28].copy_from_slice(&root_offset.to_le_bytes());
    hive[0x28..0x2C].copy_from_slice(&(data_len as u32).to_le_bytes());
    hive.extend_from_slice(&data.bytes);
    hive
}

/// A SOFTWARE hive with a Run key holding an executable and a binary blob
pub fn software_hive(now: DateTime<Utc>) -> Vec<u8> {
    let old = now - chrono::Duration::days(30);
    let run = KeySpec::new("Run", old)
        .value(ValueSpec::string("Updater", "C:\\Tools\\updater.EXE"))
        .child(
            KeySpec::new("Nested", old)
                .value(ValueSpec::binary("Blob", &[0xde, 0xad, 0xbe, 0xef, 0x01]))
                .child(KeySpec::new("Deeper", old).child(KeySpec::new("Deepest", old))),
        );
    let version = KeySpec::new("CurrentVersion", old).child(run).child(
        KeySpec::new("Uninstall", now - chrono::Duration::minutes(5))
            .value(ValueSpec::dword("Count", 7)),
    );
    let root = KeySpec::new("ROOT", old)
        .path(&["Microsoft", "Windows"], version)
        .child(KeySpec::new("Classes", old).value(ValueSpec::string("", "ignored")));
    build_hive(&root)
}

/// A hive whose root holds two plain keys
pub fn plain_hive(now: DateTime<Utc>) -> Vec<u8> {
    let old = now - chrono::Duration::days(2);
    let root = KeySpec::new("ROOT", old)
        .child(KeySpec::new("Select", old).value(ValueSpec::dword("Current", 1)))
        .child(KeySpec::new("Setup", old));
    build_hive(&root)
}

/// Writes `bytes` to `dir/name`, creating parents
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    path
}
