//! Registry extraction tests
//!
//! Hives are built with the helpers in `common` and read back through the
//! real regf reader.

mod common;

use chrono::{DateTime, Utc};
use common::{KeySpec, ValueSpec, build_hive, plain_hive, software_hive};
use evidence_triage::application::dto::{HiveStatus, RegistryOptions, TraversalStart};
use evidence_triage::application::{HiveResolution, RegistryHiveExtractor};
use evidence_triage::domain::entities::{HiveTargets, OperationType, TargetPathTable};
use evidence_triage::domain::repositories::{HiveError, RegistryHive, ValueData, ValueType};
use evidence_triage::domain::services::BudgetScope;
use evidence_triage::infrastructure::file_systems::MemoryFilesystem;
use evidence_triage::infrastructure::hive::{RegfHive, RegfParser};
use evidence_triage::infrastructure::persistence::LocalArtifactWriter;
use proptest::prelude::*;
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn now() -> DateTime<Utc> {
    Utc::now()
}

fn ntuser_hive(now: DateTime<Utc>) -> Vec<u8> {
    let old = now - chrono::Duration::days(3);
    let run = KeySpec::new("Run", old).value(ValueSpec::string("OneDrive", "onedrive.exe /background"));
    let root = KeySpec::new("ROOT", old).path(&["Software", "Microsoft", "Windows", "CurrentVersion"], run);
    build_hive(&root)
}

/// Evidence with SOFTWARE and SAM in place and SYSTEM/SECURITY missing
fn evidence(now: DateTime<Utc>) -> MemoryFilesystem {
    let mut fs = MemoryFilesystem::new().with_dot_entries();
    fs.add_file("/Windows/System32/config/SOFTWARE", &software_hive(now))
        .add_file("/windows/system32/config/sam", &plain_hive(now));
    fs
}

// ============================================================================
// regf reader
// ============================================================================

#[rstest]
fn test_reader_walks_keys_and_values(now: DateTime<Utc>) {
    let hive = RegfHive::from_bytes(software_hive(now)).unwrap();

    let root = hive.open_key("").unwrap();
    assert_eq!(root.name, "ROOT");
    let subkeys: Vec<String> = root.subkeys.into_iter().map(Result::unwrap).collect();
    assert_eq!(subkeys, vec!["Microsoft", "Classes"]);

    let run = hive.open_key(r"microsoft\WINDOWS\CurrentVersion\Run").unwrap();
    assert_eq!(run.name, "Run");
    let value = run.values[0].as_ref().unwrap();
    assert_eq!(value.name, "Updater");
    assert_eq!(value.value_type, ValueType::Sz);
    assert!(matches!(value.data, ValueData::Text(_)));
    assert_eq!(
        run.last_written.unwrap().timestamp(),
        (now - chrono::Duration::days(30)).timestamp()
    );

    let uninstall = hive.open_key(r"Microsoft\Windows\CurrentVersion\Uninstall").unwrap();
    assert_eq!(
        uninstall.values[0].as_ref().unwrap().data,
        ValueData::Dword(7)
    );
}

#[rstest]
fn test_reader_missing_key(now: DateTime<Utc>) {
    let hive = RegfHive::from_bytes(software_hive(now)).unwrap();
    assert!(matches!(
        hive.open_key(r"Microsoft\Nope"),
        Err(HiveError::KeyNotFound(_))
    ));
    // forward slashes are not separators for the reader itself
    assert!(hive.open_key("Microsoft/Windows").is_err());
}

// ============================================================================
// Extraction
// ============================================================================

#[rstest]
fn test_extract_all_outcomes_and_records(now: DateTime<Utc>) {
    let out = TempDir::new().unwrap();
    let writer = LocalArtifactWriter::new(out.path()).unwrap();
    let fs = evidence(now);
    let extractor =
        RegistryHiveExtractor::new(&writer, &RegfParser, RegistryOptions::default()).with_clock(now);

    let extraction = extractor.extract_all(&fs, None);

    let statuses: Vec<(&str, &HiveStatus)> = extraction
        .outcomes
        .iter()
        .map(|o| (o.hive.as_str(), &o.status))
        .collect();
    assert!(matches!(statuses[0], ("SYSTEM", HiveStatus::Unresolved { .. })));
    assert_eq!(statuses[1], ("SOFTWARE", &HiveStatus::Extracted { records: 4 }));
    assert_eq!(statuses[2], ("SAM", &HiveStatus::Extracted { records: 3 }));
    assert!(matches!(statuses[3], ("SECURITY", HiveStatus::Unresolved { .. })));

    let software: Vec<_> = extraction
        .records
        .iter()
        .filter(|r| r.hive == "SOFTWARE")
        .map(|r| (r.path.as_str(), r.operation_type))
        .collect();
    assert_eq!(
        software,
        vec![
            ("Microsoft/Windows/CurrentVersion/Run", OperationType::ExecutableOperation),
            ("Microsoft/Windows/CurrentVersion/Run/Nested", OperationType::BinaryOperation),
            ("Microsoft/Windows/CurrentVersion/Run/Nested/Deeper", OperationType::ReadOperation),
            ("Microsoft/Windows/CurrentVersion/Uninstall", OperationType::RecentModification),
        ]
    );
    // RunOnce, Windows NT, Internet Settings, Policies and Defender are absent
    assert_eq!(extraction.keys_skipped, 5);

    let blob = &extraction.records[1].values["Blob"];
    assert_eq!(blob.value_type, "REG_BINARY");
    assert_eq!(blob.value, "deadbeef01");

    let sam_root = extraction.records.iter().find(|r| r.hive == "SAM").unwrap();
    assert_eq!(sam_root.path, "");
    assert_eq!(sam_root.key_depth(), 0);
    assert_eq!(sam_root.subkeys, vec!["Select", "Setup"]);

    assert!(out.path().join("SOFTWARE.hive").exists());
    assert!(out.path().join("SAM.hive").exists());
    assert_eq!(extraction.statistics.total_keys, 7);
    assert_eq!(extraction.statistics.keys_per_hive["SAM"], 3);
}

#[rstest]
fn test_user_hives_and_frequency(now: DateTime<Utc>) {
    let out = TempDir::new().unwrap();
    let writer = LocalArtifactWriter::new(out.path()).unwrap();
    let mut fs = MemoryFilesystem::new();
    fs.add_file("/Users/alice/NTUSER.DAT", &ntuser_hive(now))
        .add_file("/Users/bob/ntuser.dat", &ntuser_hive(now));
    let extractor =
        RegistryHiveExtractor::new(&writer, &RegfParser, RegistryOptions::default()).with_clock(now);

    let users = extractor.resolve_user_hives(&fs);
    assert_eq!(users.len(), 2);
    assert_eq!(
        users[1].resolution,
        HiveResolution::Resolved("Users/bob/ntuser.dat".into())
    );

    let extraction = extractor.extract_all(&fs, None);
    let run: Vec<_> = extraction
        .records
        .iter()
        .filter(|r| r.path == "Software/Microsoft/Windows/CurrentVersion/Run")
        .collect();
    assert_eq!(run.len(), 2);
    assert_eq!(run[0].hive, "NTUSER_alice");
    assert_eq!(run[0].frequency(), 1);
    assert_eq!(run[1].hive, "NTUSER_bob");
    assert_eq!(run[1].frequency(), 2);
    assert_eq!(run[0].values["OneDrive"].value, "onedrive.exe /background");
    assert_eq!(run[0].operation_type, OperationType::ExecutableOperation);
}

#[rstest]
#[case::shared(BudgetScope::PerRun, 2)]
#[case::per_hive(BudgetScope::PerHive, 4)]
fn test_budget_scope(now: DateTime<Utc>, #[case] scope: BudgetScope, #[case] expected: usize) {
    let out = TempDir::new().unwrap();
    let writer = LocalArtifactWriter::new(out.path()).unwrap();
    let options = RegistryOptions {
        entry_limit: 2,
        budget_scope: scope,
        ..RegistryOptions::default()
    };
    let extractor = RegistryHiveExtractor::new(&writer, &RegfParser, options).with_clock(now);

    let extraction = extractor.extract_all(&evidence(now), None);
    assert_eq!(extraction.records.len(), expected);
}

#[rstest]
#[case::bad_signature(vec![0u8; 1024])]
#[case::too_small(b"regf....".to_vec())]
fn test_corrupted_hive_is_abandoned(now: DateTime<Utc>, #[case] bytes: Vec<u8>) {
    let out = TempDir::new().unwrap();
    let writer = LocalArtifactWriter::new(out.path()).unwrap();
    let mut fs = evidence(now);
    fs.add_file("/Windows/System32/config/SYSTEM", &bytes);
    let extractor =
        RegistryHiveExtractor::new(&writer, &RegfParser, RegistryOptions::default()).with_clock(now);

    let extraction = extractor.extract_all(&fs, None);
    assert!(matches!(
        extraction.outcomes[0].status,
        HiveStatus::Corrupted { .. }
    ));
    // siblings still extracted
    assert_eq!(
        extraction.outcomes[1].status,
        HiveStatus::Extracted { records: 4 }
    );
}

#[rstest]
fn test_root_start_prunes_with_allow_list(now: DateTime<Utc>) {
    let out = TempDir::new().unwrap();
    let writer = LocalArtifactWriter::new(out.path()).unwrap();
    let options = RegistryOptions {
        start: TraversalStart::Root,
        ..RegistryOptions::default()
    };
    let extractor = RegistryHiveExtractor::new(&writer, &RegfParser, options).with_clock(now);

    let extraction = extractor.extract_all(&evidence(now), None);
    let software: Vec<_> = extraction
        .records
        .iter()
        .filter(|r| r.hive == "SOFTWARE")
        .collect();
    // "Microsoft" alone does not contain any interesting path
    assert_eq!(software.len(), 1);
    assert_eq!(software[0].path, "");
}

#[rstest]
fn test_root_start_visits_only_allowed_branches(now: DateTime<Utc>) {
    let old = now - chrono::Duration::days(1);
    let root = KeySpec::new("ROOT", old)
        .child(KeySpec::new("Run", old).child(KeySpec::new("Startup", old)))
        .child(KeySpec::new("Other", old).child(KeySpec::new("X", old)));
    let mut fs = MemoryFilesystem::new();
    fs.add_file("/Windows/System32/config/SOFTWARE", &build_hive(&root));

    let targets = TargetPathTable {
        hives: vec![HiveTargets {
            name: "SOFTWARE".to_string(),
            base_paths: vec!["Windows/System32/config/SOFTWARE".to_string()],
            key_paths: vec!["Run".to_string()],
        }],
        ..TargetPathTable::default()
    };
    let out = TempDir::new().unwrap();
    let writer = LocalArtifactWriter::new(out.path()).unwrap();
    let options = RegistryOptions {
        start: TraversalStart::Root,
        include_user_hives: false,
        targets,
        ..RegistryOptions::default()
    };
    let extractor = RegistryHiveExtractor::new(&writer, &RegfParser, options).with_clock(now);

    let extraction = extractor.extract_all(&fs, None);
    let paths: Vec<&str> = extraction.records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["", "Run", "Run/Startup"]);
    assert!(!paths.iter().any(|p| p.starts_with("Other")));
}

#[rstest]
fn test_parallel_matches_sequential(now: DateTime<Utc>) {
    let run = |parallel: bool| {
        let out = TempDir::new().unwrap();
        let writer = LocalArtifactWriter::new(out.path()).unwrap();
        let options = RegistryOptions {
            parallel_hives: parallel,
            budget_scope: BudgetScope::PerHive,
            ..RegistryOptions::default()
        };
        let extractor = RegistryHiveExtractor::new(&writer, &RegfParser, options).with_clock(now);
        let extraction = extractor.extract_all(&evidence(now), None);
        (
            extraction.outcomes,
            extraction
                .records
                .into_iter()
                .map(|r| (r.hive, r.path))
                .collect::<Vec<_>>(),
        )
    };
    assert_eq!(run(false), run(true));
}

// ============================================================================
// Depth bound
// ============================================================================

fn chain_hive(depth: usize) -> Vec<u8> {
    let at = Utc::now() - chrono::Duration::days(1);
    let mut key = KeySpec::new(&format!("K{depth}"), at);
    for level in (1..depth).rev() {
        key = KeySpec::new(&format!("K{level}"), at).child(key);
    }
    build_hive(&KeySpec::new("ROOT", at).child(key))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_traversal_never_exceeds_max_depth(depth in 1usize..7, max_depth in 0usize..5) {
        let out = TempDir::new().unwrap();
        let writer = LocalArtifactWriter::new(out.path()).unwrap();
        let local = common::write_file(out.path(), "chain/SAM.hive", &chain_hive(depth));
        let options = RegistryOptions { max_depth, ..RegistryOptions::default() };
        let extractor = RegistryHiveExtractor::new(&writer, &RegfParser, options);

        let mut records = Vec::new();
        let status = extractor.process_hive_file(&local, "SAM", "SAM", &mut records);

        prop_assert_eq!(status, HiveStatus::Extracted { records: depth.min(max_depth) + 1 });
        prop_assert!(records.iter().all(|r| r.key_depth() <= max_depth));
    }
}
