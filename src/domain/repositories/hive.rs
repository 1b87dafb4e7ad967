//! Registry hive traits
//!
//! The extractor walks key trees through these traits and never touches the
//! hive's binary cell layout directly.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when opening or reading a hive
#[derive(Error, Debug)]
pub enum HiveError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Not a registry hive: {0}")]
    InvalidSignature(String),

    #[error("Hive too small: {size} bytes")]
    TooSmall { size: u64 },

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Malformed cell at offset {offset:#x}: {message}")]
    Malformed { offset: u32, message: String },

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Registry value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    None,
    Sz,
    ExpandSz,
    Binary,
    Dword,
    DwordBigEndian,
    Link,
    MultiSz,
    ResourceList,
    FullResourceDescriptor,
    ResourceRequirementsList,
    Qword,
    Other(u32),
}

impl ValueType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::Sz,
            2 => Self::ExpandSz,
            3 => Self::Binary,
            4 => Self::Dword,
            5 => Self::DwordBigEndian,
            6 => Self::Link,
            7 => Self::MultiSz,
            8 => Self::ResourceList,
            9 => Self::FullResourceDescriptor,
            10 => Self::ResourceRequirementsList,
            11 => Self::Qword,
            other => Self::Other(other),
        }
    }

    /// Returns true for types whose data is text
    pub fn is_string(&self) -> bool {
        matches!(self, Self::Sz | Self::ExpandSz)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "REG_NONE",
            Self::Sz => "REG_SZ",
            Self::ExpandSz => "REG_EXPAND_SZ",
            Self::Binary => "REG_BINARY",
            Self::Dword => "REG_DWORD",
            Self::DwordBigEndian => "REG_DWORD_BIG_ENDIAN",
            Self::Link => "REG_LINK",
            Self::MultiSz => "REG_MULTI_SZ",
            Self::ResourceList => "REG_RESOURCE_LIST",
            Self::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR",
            Self::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST",
            Self::Qword => "REG_QWORD",
            Self::Other(raw) => return write!(f, "REG_UNKNOWN_{raw:#x}"),
        };
        f.write_str(name)
    }
}

/// Decoded value data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueData {
    /// Raw string bytes as stored (usually UTF-16LE, NUL-terminated)
    Text(Vec<u8>),
    MultiText(Vec<String>),
    Dword(u32),
    Qword(u64),
    Bytes(Vec<u8>),
}

/// One value of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiveValue {
    /// Value name; empty for the default value
    pub name: String,
    pub value_type: ValueType,
    pub data: ValueData,
}

/// Snapshot of a key as read from the hive
///
/// Values and subkeys are read independently; a malformed entry yields an
/// error in its slot without hiding its siblings.
#[derive(Debug)]
pub struct HiveKey {
    pub name: String,
    pub last_written: Option<DateTime<Utc>>,
    pub values: Vec<Result<HiveValue, HiveError>>,
    pub subkeys: Vec<Result<String, HiveError>>,
}

/// An opened registry hive
pub trait RegistryHive: Send + Sync {
    /// Opens a key by `\`-separated path; the empty path is the root key
    fn open_key(&self, path: &str) -> Result<HiveKey, HiveError>;
}

/// Opens hive files
pub trait HiveParser: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn RegistryHive>, HiveError>;
}
