//! Registry hive implementations

mod regf;

pub use regf::{BASE_BLOCK_SIZE, REGF_SIGNATURE, RegfHive, RegfParser, filetime_to_utc};
