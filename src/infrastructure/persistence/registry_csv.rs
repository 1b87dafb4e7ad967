//! Registry CSV tables
//!
//! Three tables: the raw per-key table, the compact feature table and the
//! cleaned, all-numeric table derived from the raw one.

use super::json_exporter::ExportError;
use crate::domain::entities::{RegistryKeyRecord, path_depth};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

pub const REGISTRY_RAW_FILE: &str = "registry_raw.csv";
pub const REGISTRY_FEATURES_FILE: &str = "registry_features.csv";
pub const REGISTRY_CLEANED_FILE: &str = "registry_cleaned.csv";

const UNKNOWN_HIVE: &str = "UNKNOWN";

/// One row of `registry_raw.csv`
///
/// Every column is optional on read so that hand-edited or older tables can
/// still be cleaned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryCsvRow {
    pub hive: Option<String>,
    pub path: Option<String>,
    pub source_path: Option<String>,
    pub last_written: Option<String>,
    pub value_count: Option<u64>,
    pub subkey_count: Option<u64>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub has_binary: Option<bool>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub has_executable: Option<bool>,
    pub key_depth: Option<u64>,
    pub value_types: Option<String>,
    pub operation_type: Option<String>,
    pub frequency: Option<u64>,
    pub image_source: Option<String>,
}

impl RegistryCsvRow {
    pub fn from_record(record: &RegistryKeyRecord, image_source: &str) -> Self {
        Self {
            hive: Some(record.hive.clone()),
            path: Some(record.path.clone()),
            source_path: Some(record.source_path.clone()),
            last_written: record.last_written.map(|dt| dt.to_rfc3339()),
            value_count: Some(record.value_count() as u64),
            subkey_count: Some(record.subkey_count() as u64),
            has_binary: Some(record.has_binary()),
            has_executable: Some(record.has_executable()),
            key_depth: Some(record.key_depth() as u64),
            value_types: Some(record.value_types_joined()),
            operation_type: Some(record.operation_type.to_string()),
            frequency: Some(u64::from(record.frequency())),
            image_source: Some(image_source.to_string()),
        }
    }
}

/// Accepts `true`/`false` in any case as well as `1`/`0`
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }))
}

/// One row of `registry_features.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryFeatureRow {
    pub hive: String,
    pub path: String,
    pub last_written: Option<String>,
    pub value_count: usize,
    pub subkey_count: usize,
    pub has_binary: bool,
    pub has_executable: bool,
    pub path_depth: usize,
    pub value_types: String,
}

impl From<&RegistryKeyRecord> for RegistryFeatureRow {
    fn from(record: &RegistryKeyRecord) -> Self {
        Self {
            hive: record.hive.clone(),
            path: record.path.clone(),
            last_written: record.last_written.map(|dt| dt.to_rfc3339()),
            value_count: record.value_count(),
            subkey_count: record.subkey_count(),
            has_binary: record.has_binary(),
            has_executable: record.has_executable(),
            path_depth: path_depth(&record.path),
            value_types: record.value_types_joined(),
        }
    }
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<usize, ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush().map_err(|e| ExportError::io(path, e))?;
    info!("Wrote {} rows to {}", count, path.display());
    Ok(count)
}

/// Writes `registry_raw.csv`
pub fn write_registry_raw(
    path: &Path,
    records: &[RegistryKeyRecord],
    image_source: &str,
) -> Result<usize, ExportError> {
    if records.is_empty() {
        return write_header_only::<RegistryCsvRow>(path);
    }
    write_rows(
        path,
        records
            .iter()
            .map(|r| RegistryCsvRow::from_record(r, image_source)),
    )
}

/// Writes `registry_features.csv`
pub fn write_registry_features(path: &Path, records: &[RegistryKeyRecord]) -> Result<usize, ExportError> {
    if records.is_empty() {
        return write_header_only::<RegistryFeatureRow>(path);
    }
    write_rows(path, records.iter().map(RegistryFeatureRow::from))
}

/// Header rows for empty tables, which serde cannot derive without a row
fn write_header_only<T: HeaderOnly>(path: &Path) -> Result<usize, ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(T::HEADER)?;
    writer.flush().map_err(|e| ExportError::io(path, e))?;
    Ok(0)
}

trait HeaderOnly {
    const HEADER: &'static [&'static str];
}

impl HeaderOnly for RegistryCsvRow {
    const HEADER: &'static [&'static str] = &[
        "hive",
        "path",
        "source_path",
        "last_written",
        "value_count",
        "subkey_count",
        "has_binary",
        "has_executable",
        "key_depth",
        "value_types",
        "operation_type",
        "frequency",
        "image_source",
    ];
}

impl HeaderOnly for RegistryFeatureRow {
    const HEADER: &'static [&'static str] = &[
        "hive",
        "path",
        "last_written",
        "value_count",
        "subkey_count",
        "has_binary",
        "has_executable",
        "path_depth",
        "value_types",
    ];
}

/// All-numeric table derived from the raw registry table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<i64>>,
}

impl CleanedTable {
    /// Values of one column, if present
    pub fn column(&self, name: &str) -> Option<Vec<i64>> {
        let idx = self.headers.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    pub fn write(&self, path: &Path) -> Result<(), ExportError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(i64::to_string))?;
        }
        writer.flush().map_err(|e| ExportError::io(path, e))?;
        info!("Wrote cleaned table ({} rows) to {}", self.rows.len(), path.display());
        Ok(())
    }
}

/// Parses an exported timestamp to Unix seconds; unparseable gives 0
pub fn epoch_seconds(text: &str) -> i64 {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return dt.timestamp();
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map_or(0, |naive| naive.and_utc().timestamp())
}

fn split_types(types: Option<&str>) -> BTreeSet<&str> {
    types
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

fn hive_of(row: &RegistryCsvRow) -> &str {
    row.hive.as_deref().unwrap_or(UNKNOWN_HIVE)
}

fn codes<'a>(values: impl Iterator<Item = &'a str>) -> BTreeMap<&'a str, i64> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, i as i64))
        .collect()
}

/// Turns raw rows into the cleaned numeric table
///
/// Missing values get defaults, booleans become 0/1, timestamps become epoch
/// seconds, hive and operation type become codes into their sorted distinct
/// values (a missing operation type is -1), value types become one-hot
/// `has_<type>` columns, and textual columns are dropped in favour of a
/// derived `path_depth`.
pub fn clean_rows(rows: &[RegistryCsvRow]) -> CleanedTable {
    let hive_codes = codes(rows.iter().map(hive_of));
    let op_codes = codes(rows.iter().filter_map(|r| r.operation_type.as_deref()));
    let types: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| split_types(r.value_types.as_deref()))
        .collect();

    let mut headers: Vec<String> = [
        "hive",
        "last_written",
        "value_count",
        "subkey_count",
        "has_binary",
        "has_executable",
        "key_depth",
        "operation_type",
        "frequency",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();
    headers.extend(types.iter().map(|t| format!("has_{}", t.to_lowercase())));
    headers.push("path_depth".to_string());

    let table_rows = rows
        .iter()
        .map(|r| {
            let present = split_types(r.value_types.as_deref());
            let mut row = vec![
                hive_codes[hive_of(r)],
                r.last_written.as_deref().map_or(0, epoch_seconds),
                r.value_count.unwrap_or(0) as i64,
                r.subkey_count.unwrap_or(0) as i64,
                i64::from(r.has_binary.unwrap_or(false)),
                i64::from(r.has_executable.unwrap_or(false)),
                r.key_depth.unwrap_or(0) as i64,
                r.operation_type
                    .as_deref()
                    .and_then(|op| op_codes.get(op).copied())
                    .unwrap_or(-1),
                r.frequency.unwrap_or(1) as i64,
            ];
            row.extend(types.iter().map(|t| i64::from(present.contains(t))));
            row.push(path_depth(r.path.as_deref().unwrap_or("")) as i64);
            row
        })
        .collect();

    CleanedTable {
        headers,
        rows: table_rows,
    }
}

/// Reads a raw registry table and writes its cleaned form
pub fn clean_csv(raw_csv: &Path, cleaned_csv: &Path) -> Result<CleanedTable, ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(raw_csv)?;
    let rows = reader
        .deserialize::<RegistryCsvRow>()
        .collect::<Result<Vec<_>, _>>()?;
    let table = clean_rows(&rows);
    table.write(cleaned_csv)?;
    Ok(table)
}
