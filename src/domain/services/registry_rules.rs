//! Registry value rendering and key classification rules

use super::decode::{decode_utf16le_lossy, safe_decode};
use crate::domain::entities::{OperationType, RegistryValue};
use crate::domain::repositories::{HiveValue, ValueData, ValueType};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Name written for a key's unnamed value
pub const DEFAULT_VALUE_NAME: &str = "(Default)";

/// Window in which a last write counts as recent
pub fn recent_window() -> Duration {
    Duration::hours(1)
}

/// Renders one hive value into its exported form
///
/// String types become text, binary data lowercase hex, everything else its
/// canonical string form.
pub fn render_value(value: &HiveValue) -> (String, RegistryValue) {
    let name = if value.name.is_empty() {
        DEFAULT_VALUE_NAME.to_string()
    } else {
        value.name.clone()
    };

    let rendered = match (&value.value_type, &value.data) {
        (t, ValueData::Text(raw)) if t.is_string() => decode_string_data(raw),
        (ValueType::Binary, ValueData::Bytes(raw)) => hex::encode(raw),
        (_, data) => canonical(data),
    };

    (name, RegistryValue::new(value.value_type.to_string(), rendered))
}

fn decode_string_data(raw: &[u8]) -> String {
    // registry strings are UTF-16LE in practice; odd lengths are not
    if raw.len() % 2 == 0 {
        decode_utf16le_lossy(raw)
    } else {
        safe_decode(raw).trim_end_matches('\0').to_string()
    }
}

fn canonical(data: &ValueData) -> String {
    match data {
        ValueData::Text(raw) => decode_string_data(raw),
        ValueData::MultiText(items) => items.join(", "),
        ValueData::Dword(v) => v.to_string(),
        ValueData::Qword(v) => v.to_string(),
        ValueData::Bytes(raw) => hex::encode(raw),
    }
}

/// Classifies what last happened to a key
///
/// `values_complete` is false when any of the key's values failed to read,
/// which makes the classification unknown.
pub fn classify_operation(
    last_written: Option<DateTime<Utc>>,
    values: &BTreeMap<String, RegistryValue>,
    values_complete: bool,
    now: DateTime<Utc>,
) -> OperationType {
    let Some(written) = last_written else {
        return OperationType::UnknownOperation;
    };
    if !values_complete {
        return OperationType::UnknownOperation;
    }

    if now.signed_duration_since(written) < recent_window() {
        OperationType::RecentModification
    } else if values.values().any(RegistryValue::is_binary) {
        OperationType::BinaryOperation
    } else if values.values().any(RegistryValue::references_executable) {
        OperationType::ExecutableOperation
    } else {
        OperationType::ReadOperation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn utf16(text: &str) -> Vec<u8> {
        text.encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(|u| u.to_le_bytes())
            .collect()
    }

    fn values(items: &[(&str, &str)]) -> BTreeMap<String, RegistryValue> {
        items
            .iter()
            .enumerate()
            .map(|(i, (t, v))| (format!("v{i}"), RegistryValue::new(*t, *v)))
            .collect()
    }

    #[test]
    fn test_render_string_and_default_name() {
        let value = HiveValue {
            name: String::new(),
            value_type: ValueType::Sz,
            data: ValueData::Text(utf16("C:\\x.exe")),
        };
        let (name, rendered) = render_value(&value);
        assert_eq!(name, "(Default)");
        assert_eq!(rendered.value_type, "REG_SZ");
        assert_eq!(rendered.value, "C:\\x.exe");
    }

    #[test]
    fn test_render_binary_as_hex() {
        let value = HiveValue {
            name: "blob".into(),
            value_type: ValueType::Binary,
            data: ValueData::Bytes(vec![0xDE, 0xAD, 0x01]),
        };
        assert_eq!(render_value(&value).1.value, "dead01");
    }

    #[test]
    fn test_render_dword_canonical() {
        let value = HiveValue {
            name: "Start".into(),
            value_type: ValueType::Dword,
            data: ValueData::Dword(2),
        };
        let (_, rendered) = render_value(&value);
        assert_eq!(rendered.value_type, "REG_DWORD");
        assert_eq!(rendered.value, "2");
    }

    #[test]
    fn test_render_multi_string_joined() {
        let value = HiveValue {
            name: "Sources".into(),
            value_type: ValueType::MultiSz,
            data: ValueData::MultiText(vec!["Application".into(), "System".into()]),
        };
        let (_, rendered) = render_value(&value);
        assert_eq!(rendered.value_type, "REG_MULTI_SZ");
        assert_eq!(rendered.value, "Application, System");
    }

    #[rstest]
    #[case::recent(Duration::minutes(10), &[("REG_BINARY", "00")], OperationType::RecentModification)]
    #[case::binary(Duration::days(3), &[("REG_BINARY", "00"), ("REG_SZ", "a.exe")], OperationType::BinaryOperation)]
    #[case::executable(Duration::days(3), &[("REG_SZ", "C:\\A.EXE")], OperationType::ExecutableOperation)]
    #[case::read(Duration::days(3), &[("REG_SZ", "plain")], OperationType::ReadOperation)]
    fn test_classification_precedence(
        #[case] age: Duration,
        #[case] items: &[(&str, &str)],
        #[case] expected: OperationType,
    ) {
        let now = Utc::now();
        let got = classify_operation(Some(now - age), &values(items), true, now);
        assert_eq!(got, expected);
    }

    #[test]
    fn test_missing_timestamp_or_values_is_unknown() {
        let now = Utc::now();
        let vals = values(&[("REG_SZ", "x")]);
        assert_eq!(
            classify_operation(None, &vals, true, now),
            OperationType::UnknownOperation
        );
        assert_eq!(
            classify_operation(Some(now - Duration::days(1)), &vals, false, now),
            OperationType::UnknownOperation
        );
    }
}
