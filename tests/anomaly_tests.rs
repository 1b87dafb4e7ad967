//! Anomaly detection tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use evidence_triage::domain::entities::{
    EntryType, FilesystemEntry, OperationType, RegistryKeyRecord, Timestamp,
};
use evidence_triage::domain::services::{
    AnomalyDetector, DuplicatePolicy, HIDDEN_REASON, MALFORMED_TIMESTAMP_REASON,
};
use proptest::prelude::*;
use rstest::*;
use std::collections::BTreeMap;

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

#[fixture]
fn now() -> DateTime<Utc> {
    fixed_now()
}

fn file(path: &str, size: i64) -> FilesystemEntry {
    FilesystemEntry::new(
        path.to_string(),
        size,
        Timestamp::NotAvailable,
        Timestamp::NotAvailable,
        Timestamp::NotAvailable,
        EntryType::File,
    )
}

fn dir(path: &str) -> FilesystemEntry {
    FilesystemEntry {
        entry_type: EntryType::Directory,
        ..file(path, 4096)
    }
}

fn key(name: &str, last_written: Option<DateTime<Utc>>) -> RegistryKeyRecord {
    RegistryKeyRecord::new(
        "SOFTWARE".into(),
        format!("Microsoft/{name}"),
        name.into(),
        last_written,
        BTreeMap::new(),
        vec![],
        OperationType::ReadOperation,
        "SOFTWARE".into(),
    )
}

/// Nine 10-byte files and one large outlier
fn sized_population() -> Vec<FilesystemEntry> {
    let mut entries: Vec<_> = (0..9).map(|i| file(&format!("/f{i}"), 10)).collect();
    entries.push(file("/big.iso", 10_000));
    entries
}

// ============================================================================
// Filesystem entries
// ============================================================================

#[rstest]
fn test_size_outlier_is_flagged(now: DateTime<Utc>) {
    let anomalies = AnomalyDetector::default().detect_at(&sized_population(), now);

    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].record.path, "/big.iso");
    assert!(anomalies[0]
        .anomaly_reason
        .starts_with("Unusual file size (mean=1009.00, stdev=3159.1"));
}

#[rstest]
fn test_directories_and_empty_files_stay_out_of_statistics(now: DateTime<Utc>) {
    let mut entries = sized_population();
    // a huge directory must not pull the mean
    entries.push(dir("/huge_dir"));
    entries.push(file("/zero", 0));

    let anomalies = AnomalyDetector::default().detect_at(&entries, now);
    let flagged: Vec<&str> = anomalies.iter().map(|a| a.record.path.as_str()).collect();
    assert_eq!(flagged, vec!["/big.iso"]);
}

#[rstest]
fn test_too_few_sizes_reports_nothing(now: DateTime<Utc>) {
    // would be hidden, but there is only one positive size
    let entries = vec![file("/.secret", 5), dir("/d"), file("/empty", 0)];
    assert!(AnomalyDetector::default().detect_at(&entries, now).is_empty());
}

#[rstest]
fn test_rule_order_with_per_rule_policy(now: DateTime<Utc>) {
    let mut odd = file("/.cache", 10);
    odd.modified_time = Timestamp::Valid(now + Duration::days(2));
    odd.created_time = Timestamp::Invalid("Invalid Timestamp".into());
    // accessed time is not checked
    odd.accessed_time = Timestamp::Invalid("Invalid Timestamp".into());
    let entries = vec![odd, file("/a", 10), file("/b", 10)];

    let reasons: Vec<String> = AnomalyDetector::default()
        .detect_at(&entries, now)
        .into_iter()
        .map(|a| a.anomaly_reason)
        .collect();
    assert_eq!(
        reasons,
        vec![
            "Future modified_time detected".to_string(),
            HIDDEN_REASON.to_string(),
            MALFORMED_TIMESTAMP_REASON.to_string(),
        ]
    );
}

#[rstest]
fn test_merge_policy_emits_one_per_record(now: DateTime<Utc>) {
    let mut odd = file("/.cache", 10);
    odd.created_time = Timestamp::Valid(now + Duration::hours(1));
    let entries = vec![odd, file("/a", 10), file("/.b", 10)];

    let merged = AnomalyDetector::new(2.0, DuplicatePolicy::Merge).detect_at(&entries, now);
    assert_eq!(merged.len(), 2);
    assert_eq!(
        merged[0].anomaly_reason,
        "Future created_time detected; anomaly detected"
    );
    assert_eq!(merged[1].anomaly_reason, HIDDEN_REASON);
}

#[rstest]
fn test_anomaly_json_flattens_entry(now: DateTime<Utc>) {
    let anomalies = AnomalyDetector::default().detect_at(&sized_population(), now);
    let json = serde_json::to_value(&anomalies[0]).unwrap();

    assert_eq!(json["path"], "/big.iso");
    assert_eq!(json["size"], 10_000);
    assert_eq!(json["type"], "File");
    assert_eq!(json["modified_time"], "N/A");
    assert!(json["anomaly_reason"].as_str().unwrap().starts_with("Unusual"));
}

// ============================================================================
// Registry records
// ============================================================================

#[rstest]
fn test_registry_records_skip_size_rules(now: DateTime<Utc>) {
    let records = vec![
        key("Run", Some(now + Duration::days(1))),
        key(".hidden", Some(now - Duration::days(1))),
        key("Plain", None),
    ];

    let anomalies = AnomalyDetector::default().detect_at(&records, now);
    let reasons: Vec<(&str, &str)> = anomalies
        .iter()
        .map(|a| (a.record.key_name.as_str(), a.anomaly_reason.as_str()))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("Run", "Future last_written detected"),
            (".hidden", HIDDEN_REASON),
        ]
    );
}

#[rstest]
fn test_single_registry_record_is_still_checked(now: DateTime<Utc>) {
    let records = vec![key(".x", None)];
    assert_eq!(AnomalyDetector::default().detect_at(&records, now).len(), 1);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_uniform_sizes_are_never_unusual(size in 1i64..1_000_000, count in 2usize..40) {
        let entries: Vec<_> = (0..count).map(|i| file(&format!("/f{i}"), size)).collect();
        let anomalies = AnomalyDetector::default().detect_at(&entries, fixed_now());
        prop_assert!(anomalies.is_empty());
    }

    #[test]
    fn prop_merge_never_emits_more_than_per_rule(
        sizes in proptest::collection::vec(0i64..5_000, 2..30),
        hidden in proptest::collection::vec(any::<bool>(), 30),
    ) {
        let entries: Vec<_> = sizes
            .iter()
            .zip(&hidden)
            .enumerate()
            .map(|(i, (&size, &dot))| {
                let name = if dot { format!("/.f{i}") } else { format!("/f{i}") };
                file(&name, size)
            })
            .collect();

        let per_rule = AnomalyDetector::default().detect_at(&entries, fixed_now());
        let merged = AnomalyDetector::new(2.0, DuplicatePolicy::Merge).detect_at(&entries, fixed_now());

        prop_assert!(merged.len() <= per_rule.len());
        let mut flagged: Vec<&str> = per_rule.iter().map(|a| a.record.path.as_str()).collect();
        flagged.dedup();
        prop_assert_eq!(flagged.len(), merged.len());
    }
}
