//! Extract registry use case
//!
//! Resolves hive files inside the mounted filesystem, copies them out,
//! checks them and walks their key trees into [`RegistryKeyRecord`]s.
//!
//! Resolution and copying are sequential. Traversal can run across hives in
//! parallel; the extraction budget is atomic and the frequency counter sits
//! behind a mutex, so both are shared safely.

use crate::application::dto::{
    HiveOutcome, HiveStatus, RegistryOptions, RegistryStatistics, TraversalStart,
};
use crate::domain::entities::{NTUSER, RegistryKeyRecord, RegistryValue};
use crate::domain::repositories::{
    ArtifactWriteError, ArtifactWriter, HiveError, HiveKey, HiveParser, MountedFilesystem,
    RegistryHive,
};
use crate::domain::services::{
    BudgetScope, ExtractionBudget, classify_operation, render_value, safe_decode,
};
use crate::infrastructure::hive::REGF_SIGNATURE;
use aho_corasick::AhoCorasick;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Smallest copy accepted as a hive
pub const MIN_HIVE_SIZE: u64 = 512;

/// Result of looking a hive up in the filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HiveResolution {
    /// First candidate path that exists
    Resolved(String),
    /// Every candidate that was tried
    Unresolved(Vec<String>),
}

/// A hive name paired with where it was looked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHive {
    pub hive_name: String,
    pub resolution: HiveResolution,
}

/// Records and outcomes of a full extraction
#[derive(Debug, Clone, Default)]
pub struct RegistryExtraction {
    /// Records of every hive, in resolution order
    pub records: Vec<RegistryKeyRecord>,
    pub outcomes: Vec<HiveOutcome>,
    pub statistics: RegistryStatistics,
    pub keys_skipped: usize,
    pub values_skipped: usize,
}

/// Called with each hive's outcome once it is done
pub type HiveProgressCallback<'a> = &'a (dyn Fn(&HiveOutcome) + Send + Sync);

/// Copied hive waiting for traversal
struct PendingHive {
    hive_name: String,
    source_path: String,
    local_path: PathBuf,
}

enum Slot {
    Pending(PendingHive),
    Done(HiveOutcome),
}

/// Per-hive traversal settings
struct TraversalContext<'h> {
    hive_name: &'h str,
    source_path: &'h str,
    allow_list: Option<AhoCorasick>,
    budget: &'h ExtractionBudget,
}

/// Registry hive extractor
///
/// Copies go through an [`ArtifactWriter`] and hives are opened through a
/// [`HiveParser`], so both can be swapped in tests.
pub struct RegistryHiveExtractor<'a> {
    writer: &'a dyn ArtifactWriter,
    parser: &'a dyn HiveParser,
    options: RegistryOptions,
    run_budget: ExtractionBudget,
    frequency: Mutex<HashMap<String, u32>>,
    keys_skipped: AtomicUsize,
    values_skipped: AtomicUsize,
    now: DateTime<Utc>,
}

impl<'a> RegistryHiveExtractor<'a> {
    pub fn new(
        writer: &'a dyn ArtifactWriter,
        parser: &'a dyn HiveParser,
        options: RegistryOptions,
    ) -> Self {
        Self {
            writer,
            parser,
            run_budget: ExtractionBudget::new(options.entry_limit),
            options,
            frequency: Mutex::new(HashMap::new()),
            keys_skipped: AtomicUsize::new(0),
            values_skipped: AtomicUsize::new(0),
            now: Utc::now(),
        }
    }

    /// Fixes the instant used to decide what counts as a recent write
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Records claimed from the run-wide budget so far
    pub fn budget_used(&self) -> usize {
        self.run_budget.used()
    }

    /// Looks up every configured system hive
    ///
    /// Candidate paths are tried in declared order; the first that exists
    /// wins.
    pub fn resolve_hive_paths(&self, fs: &dyn MountedFilesystem) -> Vec<ResolvedHive> {
        self.options
            .targets
            .hives
            .iter()
            .map(|hive| {
                let resolution = first_existing(fs, hive.base_paths.iter().cloned());
                match &resolution {
                    HiveResolution::Resolved(path) => info!("Found {} hive at {}", hive.name, path),
                    HiveResolution::Unresolved(attempted) => warn!(
                        "Could not find {} hive (tried {} paths)",
                        hive.name,
                        attempted.len()
                    ),
                }
                ResolvedHive {
                    hive_name: hive.name.clone(),
                    resolution,
                }
            })
            .collect()
    }

    /// Looks up `NTUSER.DAT` for every user profile directory
    ///
    /// Hives are named `NTUSER_<user>`. Unlistable profile roots are skipped.
    pub fn resolve_user_hives(&self, fs: &dyn MountedFilesystem) -> Vec<ResolvedHive> {
        let targets = &self.options.targets.user_hives;
        let mut resolved = Vec::new();

        for dir in &targets.profile_dirs {
            let users = match fs.list_directory(dir) {
                Ok(users) => users,
                Err(e) => {
                    debug!("No profile directory {}: {}", dir, e);
                    continue;
                }
            };

            for user in users {
                if user.is_dot() || !user.metadata.as_ref().is_some_and(|m| m.is_directory()) {
                    continue;
                }
                let user_name = safe_decode(&user.name);
                let candidates = targets
                    .file_names
                    .iter()
                    .map(|file| format!("{dir}/{user_name}/{file}"));
                let resolution = first_existing(fs, candidates);
                if let HiveResolution::Resolved(path) = &resolution {
                    info!("Found user hive for {} at {}", user_name, path);
                }
                resolved.push(ResolvedHive {
                    hive_name: format!("{NTUSER}_{user_name}"),
                    resolution,
                });
            }
        }

        resolved
    }

    /// Copies a hive out of the evidence into `<hive_name>.hive`
    pub fn copy_hive(
        &self,
        fs: &dyn MountedFilesystem,
        source: &str,
        hive_name: &str,
    ) -> Result<PathBuf, ArtifactWriteError> {
        let size_hint = fs
            .open_path(source)
            .ok()
            .and_then(|m| m.size)
            .map(|s| s.max(0) as u64);
        let dest = PathBuf::from(format!("{hive_name}.hive"));
        let copy = self.writer.copy_file(fs, source, size_hint, &dest)?;
        debug!("Copied {} ({} bytes) to {}", source, copy.saved_size, copy.saved_path.display());
        Ok(copy.saved_path)
    }

    /// Extracts every resolvable hive
    pub fn extract_all(
        &self,
        fs: &dyn MountedFilesystem,
        progress: Option<HiveProgressCallback<'_>>,
    ) -> RegistryExtraction {
        let mut resolved = self.resolve_hive_paths(fs);
        if self.options.include_user_hives {
            resolved.extend(self.resolve_user_hives(fs));
        }

        let slots: Vec<Slot> = resolved
            .into_iter()
            .map(|hive| self.prepare(fs, hive))
            .collect();

        let run = |slot: &Slot| -> (HiveOutcome, Vec<RegistryKeyRecord>) {
            let result = match slot {
                Slot::Done(outcome) => (outcome.clone(), Vec::new()),
                Slot::Pending(pending) => {
                    let mut records = Vec::new();
                    let status = self.process_hive_file(
                        &pending.local_path,
                        &pending.hive_name,
                        &pending.source_path,
                        &mut records,
                    );
                    let outcome = HiveOutcome {
                        hive: pending.hive_name.clone(),
                        source_path: Some(pending.source_path.clone()),
                        status,
                    };
                    (outcome, records)
                }
            };
            if let Some(callback) = progress {
                callback(&result.0);
            }
            result
        };

        let per_hive: Vec<(HiveOutcome, Vec<RegistryKeyRecord>)> = if self.options.parallel_hives {
            slots.par_iter().map(run).collect()
        } else {
            slots.iter().map(run).collect()
        };

        let mut extraction = RegistryExtraction::default();
        for (outcome, records) in per_hive {
            extraction.outcomes.push(outcome);
            extraction.records.extend(records);
        }
        extraction.statistics = RegistryStatistics::from_records(&extraction.records);
        extraction.keys_skipped = self.keys_skipped.load(Ordering::Relaxed);
        extraction.values_skipped = self.values_skipped.load(Ordering::Relaxed);
        extraction.statistics.log();

        info!(
            "Registry extraction complete: {} records from {} hives",
            extraction.records.len(),
            extraction
                .outcomes
                .iter()
                .filter(|o| matches!(o.status, HiveStatus::Extracted { .. }))
                .count()
        );
        extraction
    }

    fn prepare(&self, fs: &dyn MountedFilesystem, hive: ResolvedHive) -> Slot {
        let source = match hive.resolution {
            HiveResolution::Resolved(path) => path,
            HiveResolution::Unresolved(attempted) => {
                return Slot::Done(HiveOutcome {
                    hive: hive.hive_name,
                    source_path: None,
                    status: HiveStatus::Unresolved { attempted },
                });
            }
        };

        info!("Extracting hive {} from {}", hive.hive_name, source);
        match self.copy_hive(fs, &source, &hive.hive_name) {
            Ok(local_path) => Slot::Pending(PendingHive {
                hive_name: hive.hive_name,
                source_path: source,
                local_path,
            }),
            Err(e) => {
                warn!("Failed to copy hive {}: {}", hive.hive_name, e);
                Slot::Done(HiveOutcome {
                    hive: hive.hive_name,
                    source_path: Some(source),
                    status: HiveStatus::Failed {
                        reason: e.to_string(),
                    },
                })
            }
        }
    }

    /// Checks, opens and traverses one local hive copy
    ///
    /// Records are appended to `records`. Problems are reported in the
    /// returned status, never raised.
    pub fn process_hive_file(
        &self,
        local_path: &Path,
        hive_name: &str,
        source_path: &str,
        records: &mut Vec<RegistryKeyRecord>,
    ) -> HiveStatus {
        if let Err(e) = verify_hive_integrity(local_path) {
            warn!("Hive {} failed integrity check: {}", hive_name, e);
            return HiveStatus::Corrupted {
                reason: e.to_string(),
            };
        }

        let hive = match self.parser.open(local_path) {
            Ok(hive) => hive,
            Err(e) => {
                warn!("Cannot open hive {}: {}", hive_name, e);
                return HiveStatus::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let hive_budget;
        let budget = match self.options.budget_scope {
            BudgetScope::PerRun => &self.run_budget,
            BudgetScope::PerHive => {
                hive_budget = ExtractionBudget::new(self.options.entry_limit);
                &hive_budget
            }
        };

        let hive_type = if hive_name.starts_with(NTUSER) {
            NTUSER
        } else {
            hive_name
        };
        let key_paths = self.options.targets.key_paths_for(hive_type);
        debug!("Processing hive type {} ({} key paths)", hive_type, key_paths.len());

        let ctx = TraversalContext {
            hive_name,
            source_path,
            allow_list: build_allow_list(key_paths),
            budget,
        };

        let before = records.len();
        if key_paths.is_empty() || self.options.start == TraversalStart::Root {
            self.traverse(hive.as_ref(), &ctx, "", 0, records);
        } else {
            for key_path in key_paths {
                if budget.is_exhausted() {
                    break;
                }
                self.traverse(hive.as_ref(), &ctx, key_path, 0, records);
            }
        }

        let extracted = records.len() - before;
        info!("Hive {}: {} keys recorded", hive_name, extracted);
        HiveStatus::Extracted { records: extracted }
    }

    /// Records the key at `path`, then descends into its subkeys
    fn traverse(
        &self,
        hive: &dyn RegistryHive,
        ctx: &TraversalContext<'_>,
        path: &str,
        depth: usize,
        records: &mut Vec<RegistryKeyRecord>,
    ) {
        if ctx.budget.is_exhausted() {
            return;
        }

        let key = match open_with_fallback(hive, path) {
            Ok(key) => key,
            Err(e) => {
                debug!("Skipping key {} in {}: {}", path, ctx.hive_name, e);
                self.keys_skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        if !ctx.budget.try_acquire() {
            return;
        }

        let mut values = BTreeMap::new();
        let mut values_complete = true;
        for value in &key.values {
            match value {
                Ok(value) => {
                    let (name, rendered): (String, RegistryValue) = render_value(value);
                    values.insert(name, rendered);
                }
                Err(e) => {
                    debug!("Skipping value in {}: {}", path, e);
                    self.values_skipped.fetch_add(1, Ordering::Relaxed);
                    values_complete = false;
                }
            }
        }

        let subkeys: Vec<String> = key
            .subkeys
            .iter()
            .filter_map(|s| match s {
                Ok(name) => Some(name.clone()),
                Err(e) => {
                    debug!("Skipping subkey of {}: {}", path, e);
                    None
                }
            })
            .collect();

        let record_path = path.replace('\\', "/");
        let frequency = {
            let mut counts = self.frequency.lock();
            let count = counts.entry(record_path.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let operation_type = classify_operation(key.last_written, &values, values_complete, self.now);

        records.push(
            RegistryKeyRecord::new(
                ctx.hive_name.to_string(),
                record_path.clone(),
                key.name.clone(),
                key.last_written,
                values,
                subkeys.clone(),
                operation_type,
                ctx.source_path.to_string(),
            )
            .with_frequency(frequency),
        );

        if depth >= self.options.max_depth {
            return;
        }
        for subkey in subkeys {
            if ctx.budget.is_exhausted() {
                break;
            }
            let child_path = if path.is_empty() {
                subkey
            } else {
                format!("{path}/{subkey}")
            };
            if let Some(allow_list) = &ctx.allow_list {
                if !allow_list.is_match(&child_path.replace('\\', "/")) {
                    continue;
                }
            }
            self.traverse(hive, ctx, &child_path, depth + 1, records);
        }
    }
}

fn first_existing(
    fs: &dyn MountedFilesystem,
    candidates: impl Iterator<Item = String>,
) -> HiveResolution {
    let mut attempted = Vec::new();
    for candidate in candidates {
        match fs.open_path(&candidate) {
            Ok(_) => return HiveResolution::Resolved(candidate),
            Err(e) => {
                debug!("Path {} not usable: {}", candidate, e);
                attempted.push(candidate);
            }
        }
    }
    HiveResolution::Unresolved(attempted)
}

/// Opens a key as composed, then with `/` turned into `\`
///
/// A leading `ROOT\` is stripped first.
fn open_with_fallback(
    hive: &dyn RegistryHive,
    path: &str,
) -> Result<HiveKey, HiveError> {
    let path = path
        .strip_prefix("ROOT\\")
        .or_else(|| path.strip_prefix("ROOT/"))
        .unwrap_or(path);
    match hive.open_key(path) {
        Ok(key) => Ok(key),
        Err(first) if path.contains('/') => hive.open_key(&path.replace('/', "\\")).map_err(|e| {
            debug!("Lookup of {} failed ({}), fallback failed too", path, first);
            e
        }),
        Err(e) => Err(e),
    }
}

/// Case-insensitive matcher over `/`-normalized interesting paths
fn build_allow_list(key_paths: &[String]) -> Option<AhoCorasick> {
    if key_paths.is_empty() {
        return None;
    }
    let patterns: Vec<String> = key_paths.iter().map(|p| p.replace('\\', "/")).collect();
    match AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&patterns)
    {
        Ok(matcher) => Some(matcher),
        Err(e) => {
            warn!("Cannot build key allow-list, descending without it: {}", e);
            None
        }
    }
}

/// Checks the `regf` signature and minimum size of a local hive copy
pub fn verify_hive_integrity(path: &Path) -> Result<(), HiveError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size < MIN_HIVE_SIZE {
        return Err(HiveError::TooSmall { size });
    }
    let mut signature = [0u8; 4];
    file.read_exact(&mut signature)?;
    if &signature != REGF_SIGNATURE {
        return Err(HiveError::InvalidSignature(hex::encode(signature)));
    }
    Ok(())
}
