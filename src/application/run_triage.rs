//! Run triage use case
//!
//! Wires the evidence container, the mounted filesystem, the walker, the
//! registry extractor, the anomaly detector and the exporters into one run.
//! Every output that can be produced is written before a fatal error is
//! returned.

use crate::application::dto::{HiveOutcome, HiveStatus, TriageConfig, TriageReport};
use crate::application::extract_registry::RegistryHiveExtractor;
use crate::application::walk_filesystem::{ArtifactWalker, CaptureRoutes, HiveCandidate, WalkOutcome};
use crate::domain::entities::{FilesystemEntry, RegistryKeyRecord};
use crate::domain::repositories::{ArtifactWriter, HiveParser, MountedFilesystem};
use crate::domain::services::{AnomalyDetector, EvidenceContainer};
use crate::error::TriageError;
use crate::infrastructure::block_device::{
    SegmentedImage, collect_image_metadata, detect_filesystem, discover_segments,
};
use crate::infrastructure::hive::RegfParser;
use crate::infrastructure::persistence::{
    ANALYSIS_RESULTS_FILE, ANOMALIES_FILE, ExportError, IMAGE_METADATA_FILE, JsonExporter,
    LocalArtifactWriter, REGISTRY_ANOMALIES_FILE, REGISTRY_CLEANED_FILE, REGISTRY_FEATURES_FILE,
    REGISTRY_FULL_FILE, REGISTRY_RAW_FILE, clean_csv, write_registry_features, write_registry_raw,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Called for every recorded filesystem entry
pub type EntryProgressCallback = Box<dyn Fn(&FilesystemEntry) + Send + Sync>;

/// Called for every finished hive
pub type HiveDoneCallback = Box<dyn Fn(&HiveOutcome) + Send + Sync>;

/// Triage pipeline
///
/// Holds the configuration and the output directory; each run gets its own
/// writer, extractor and report.
pub struct TriagePipeline {
    config: TriageConfig,
    output_dir: PathBuf,
    parser: Box<dyn HiveParser>,
    on_entry: Option<EntryProgressCallback>,
    on_hive: Option<HiveDoneCallback>,
}

impl TriagePipeline {
    /// Creates a pipeline that opens hives with [`RegfParser`]
    pub fn new(config: TriageConfig, output_dir: &Path) -> Self {
        Self {
            config,
            output_dir: output_dir.to_path_buf(),
            parser: Box::new(RegfParser),
            on_entry: None,
            on_hive: None,
        }
    }

    /// Replaces the hive parser
    pub fn with_parser(mut self, parser: Box<dyn HiveParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_entry_progress(mut self, callback: EntryProgressCallback) -> Self {
        self.on_entry = Some(callback);
        self
    }

    pub fn with_hive_progress(mut self, callback: HiveDoneCallback) -> Self {
        self.on_hive = Some(callback);
        self
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn writer(&self) -> Result<LocalArtifactWriter, TriageError> {
        Ok(LocalArtifactWriter::new(&self.output_dir)?
            .with_chunk_size(self.config.walker.capture_chunk_size))
    }

    /// Runs the whole pipeline
    ///
    /// `evidence` is the container directory or first segment; when given,
    /// segments are discovered, summarized and probed. `fs` is the
    /// filesystem mounted from that container.
    pub fn run(
        &self,
        evidence: Option<&Path>,
        fs: &dyn MountedFilesystem,
    ) -> Result<TriageReport, TriageError> {
        let start_time = Instant::now();
        let source = evidence
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.config.walker.root.clone());
        let mut report = TriageReport::new(source, self.output_dir.clone());
        let writer = self.writer()?;

        info!("Starting triage of {}", report.source);

        let container = match evidence {
            Some(path) => Some(self.open_container(path, &mut report)?),
            None => None,
        };

        let walked = self.walk(fs, &writer, &mut report);
        let outcome = match walked {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Walk aborted: {}", e);
                if let Some(container) = container {
                    report.bad_chunks = container.bad_chunks();
                    container.close();
                }
                return Err(e);
            }
        };

        if self.config.registry.enabled {
            self.extract_registry(fs, &writer, &outcome.hive_candidates, &mut report);
        }

        if let Some(container) = container {
            report.bad_chunks = container.bad_chunks();
            container.close();
        }

        report.duration = start_time.elapsed();
        info!(
            "Triage finished in {:.2}s ({} outputs, {} errors)",
            report.duration.as_secs_f64(),
            report.outputs.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Walks `fs` and writes the file analysis outputs only
    pub fn run_walk(&self, fs: &dyn MountedFilesystem) -> Result<TriageReport, TriageError> {
        let start_time = Instant::now();
        let mut report = TriageReport::new(self.config.walker.root.clone(), self.output_dir.clone());
        let writer = self.writer()?;
        self.walk(fs, &writer, &mut report)?;
        report.duration = start_time.elapsed();
        Ok(report)
    }

    /// Extracts the configured hives from `fs` and writes the registry outputs
    pub fn run_registry(&self, fs: &dyn MountedFilesystem) -> Result<TriageReport, TriageError> {
        let start_time = Instant::now();
        let mut report = TriageReport::new(self.config.walker.root.clone(), self.output_dir.clone());
        let writer = self.writer()?;
        self.extract_registry(fs, &writer, &[], &mut report);
        report.duration = start_time.elapsed();
        Ok(report)
    }

    /// Processes one local hive file and writes the registry outputs
    pub fn run_hive_file(&self, hive: &Path, hive_name: &str) -> Result<TriageReport, TriageError> {
        let start_time = Instant::now();
        let source = hive.display().to_string();
        let mut report = TriageReport::new(source.clone(), self.output_dir.clone());
        let writer = self.writer()?;
        let extractor =
            RegistryHiveExtractor::new(&writer, self.parser.as_ref(), self.config.registry.clone());

        let mut records = Vec::new();
        let status = extractor.process_hive_file(hive, hive_name, &source, &mut records);
        report.hives.push(HiveOutcome {
            hive: hive_name.to_string(),
            source_path: Some(source),
            status,
        });
        report.registry_records = records.len();
        note_failed_hives(&mut report);

        self.export_registry(&records, &mut report);
        report.duration = start_time.elapsed();
        Ok(report)
    }

    /// Discovers segments, writes image metadata and probes the filesystem
    pub fn open_container(
        &self,
        evidence: &Path,
        report: &mut TriageReport,
    ) -> Result<EvidenceContainer<SegmentedImage>, TriageError> {
        let segments = discover_segments(evidence)?;
        info!(
            "Found {} {} segment(s)",
            segments.paths.len(),
            segments.format
        );

        let metadata = collect_image_metadata(evidence, &segments)?;
        self.export(IMAGE_METADATA_FILE, &metadata, report);
        report.image = Some(metadata);

        let container = EvidenceContainer::open(&segments.paths)?
            .with_chunk_size(self.config.container.chunk_size)
            .with_policy(self.config.container.bad_chunk_policy);
        info!("Opened container: {} bytes", container.size());

        report.filesystem_type = Some(detect_filesystem(&container).name().to_string());
        Ok(container)
    }

    /// Walks `fs` and writes the file analysis outputs
    pub fn walk(
        &self,
        fs: &dyn MountedFilesystem,
        writer: &dyn ArtifactWriter,
        report: &mut TriageReport,
    ) -> Result<WalkOutcome, TriageError> {
        let options = &self.config.walker;
        let routes = CaptureRoutes {
            logs: options.capture_logs,
            hives: options.capture_hives,
        };
        let walker = ArtifactWalker::new(writer, routes);
        let on_entry = |entry: &FilesystemEntry| {
            if let Some(callback) = &self.on_entry {
                callback(entry);
            }
        };
        let outcome = walker.walk(fs, &options.root, options.max_depth, on_entry)?;

        report.entries_recorded = outcome.entries.len();
        report.entries_skipped = outcome.skipped;
        report.entry_failures = outcome.failures;
        report.artifacts_captured = outcome.captured.len();
        report.capture_failures = outcome.capture_failures;

        self.export(ANALYSIS_RESULTS_FILE, &outcome.entries, report);

        let detector = self.detector();
        let anomalies = detector.detect(&outcome.entries);
        report.file_anomalies = anomalies.len();
        info!("Detected {} file anomalies", anomalies.len());
        self.export(ANOMALIES_FILE, &anomalies, report);

        Ok(outcome)
    }

    /// Extracts registry hives and writes the registry outputs
    ///
    /// Hives found by the walker are processed after the configured ones,
    /// except those whose source file was already extracted this run.
    pub fn extract_registry(
        &self,
        fs: &dyn MountedFilesystem,
        writer: &dyn ArtifactWriter,
        candidates: &[HiveCandidate],
        report: &mut TriageReport,
    ) -> Vec<RegistryKeyRecord> {
        let extractor =
            RegistryHiveExtractor::new(writer, self.parser.as_ref(), self.config.registry.clone());
        let progress = self
            .on_hive
            .as_ref()
            .map(|cb| &**cb as &(dyn Fn(&HiveOutcome) + Send + Sync));
        let mut extraction = extractor.extract_all(fs, progress);

        let mut seen: HashSet<String> = extraction
            .outcomes
            .iter()
            .filter_map(|o| o.source_path.as_deref())
            .map(artifact_key)
            .collect();
        for candidate in candidates {
            if !seen.insert(artifact_key(&candidate.source_path)) {
                debug!(
                    "Hive {} at {} already extracted, skipping walker copy",
                    candidate.hive_name, candidate.source_path
                );
                continue;
            }
            let status = extractor.process_hive_file(
                &candidate.local_path,
                &candidate.hive_name,
                &candidate.source_path,
                &mut extraction.records,
            );
            let outcome = HiveOutcome {
                hive: candidate.hive_name.clone(),
                source_path: Some(candidate.source_path.clone()),
                status,
            };
            if let Some(callback) = progress {
                callback(&outcome);
            }
            extraction.outcomes.push(outcome);
        }

        report.hives = extraction.outcomes;
        report.registry_records = extraction.records.len();
        report.keys_skipped = extraction.keys_skipped;
        report.values_skipped = extraction.values_skipped;
        note_failed_hives(report);

        let records = extraction.records;
        self.export_registry(&records, report);
        records
    }

    fn export_registry(&self, records: &[RegistryKeyRecord], report: &mut TriageReport) {
        if records.is_empty() {
            warn!("No registry keys extracted");
        }
        self.export(REGISTRY_FULL_FILE, records, report);

        let raw_path = self.output_dir.join(REGISTRY_RAW_FILE);
        let raw_written = write_registry_raw(&raw_path, records, &report.source);
        let raw_ok = raw_written.is_ok();
        self.record(raw_written.map(|_| raw_path.clone()), report);

        if self.config.export.features_csv {
            let path = self.output_dir.join(REGISTRY_FEATURES_FILE);
            let written = write_registry_features(&path, records).map(|_| path);
            self.record(written, report);
        }

        if self.config.export.cleaned_csv && raw_ok {
            let path = self.output_dir.join(REGISTRY_CLEANED_FILE);
            let written = clean_csv(&raw_path, &path).map(|_| path);
            self.record(written, report);
        }

        if self.config.anomaly.include_registry {
            let anomalies = self.detector().detect(records);
            report.registry_anomalies = anomalies.len();
            info!("Detected {} registry anomalies", anomalies.len());
            self.export(REGISTRY_ANOMALIES_FILE, &anomalies, report);
        }
    }

    fn detector(&self) -> AnomalyDetector {
        AnomalyDetector::new(
            self.config.anomaly.size_threshold,
            self.config.anomaly.duplicate_policy,
        )
    }

    /// Writes one JSON document; failures are recorded, not raised
    fn export<T: Serialize + ?Sized>(&self, file_name: &str, value: &T, report: &mut TriageReport) {
        let written = JsonExporter::new(&self.output_dir).write(file_name, value);
        self.record(written, report);
    }

    fn record(&self, written: Result<PathBuf, ExportError>, report: &mut TriageReport) {
        match written {
            Ok(path) => report.add_output(path),
            Err(e) => {
                warn!("Export failed: {}", e);
                report.add_error(e.to_string());
            }
        }
    }
}

/// Identity of a hive file inside the evidence; Windows paths ignore case
fn artifact_key(source_path: &str) -> String {
    source_path.trim_start_matches('/').to_ascii_lowercase()
}

fn note_failed_hives(report: &mut TriageReport) {
    let failed: Vec<String> = report
        .hives
        .iter()
        .filter(|h| !matches!(h.status, HiveStatus::Extracted { .. }))
        .map(|h| format!("{}: {}", h.hive, h.status))
        .collect();
    report.errors.extend(failed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::file_systems::MemoryFilesystem;
    use tempfile::TempDir;

    #[test]
    fn test_run_without_container() {
        let out = TempDir::new().unwrap();
        let mut fs = MemoryFilesystem::new();
        fs.add_file("/a.bin", &[1; 10])
            .add_file("/b.bin", &[1; 12])
            .add_file("/var/log/syslog", b"boot ok\n");

        let pipeline = TriagePipeline::new(TriageConfig::default(), out.path());
        let report = pipeline.run(None, &fs).unwrap();

        assert_eq!(report.entries_recorded, 5);
        assert_eq!(report.artifacts_captured, 1);
        assert_eq!(report.hives.len(), 4);
        assert!(out.path().join(ANALYSIS_RESULTS_FILE).exists());
        assert!(out.path().join(REGISTRY_RAW_FILE).exists());
        assert!(out.path().join("extracted_logs/var_log_syslog").exists());
        assert!(
            out.path()
                .join("extracted_logs/var_log_syslog_metadata.txt")
                .exists()
        );
    }

    #[test]
    fn test_unreadable_root_is_fatal() {
        let out = TempDir::new().unwrap();
        let mut fs = MemoryFilesystem::new();
        fs.add_dir("/evidence").mark_unreadable("/evidence");

        let mut config = TriageConfig::default();
        config.walker.root = "/evidence".into();
        let pipeline = TriagePipeline::new(config, out.path());

        let err = pipeline.run(None, &fs).unwrap_err();
        assert!(matches!(err, TriageError::Walk(_)));
    }
}
