//! Persistence adapters: artifact copies, JSON documents and CSV tables

mod json_exporter;
mod local_artifact_writer;
mod registry_csv;

pub use json_exporter::{
    ANALYSIS_RESULTS_FILE, ANOMALIES_FILE, ExportError, IMAGE_METADATA_FILE, JsonExporter,
    REGISTRY_ANOMALIES_FILE, REGISTRY_FULL_FILE,
};
pub use local_artifact_writer::{DEFAULT_COPY_CHUNK, LocalArtifactWriter};
pub use registry_csv::{
    CleanedTable, REGISTRY_CLEANED_FILE, REGISTRY_FEATURES_FILE, REGISTRY_RAW_FILE,
    RegistryCsvRow, RegistryFeatureRow, clean_csv, clean_rows, epoch_seconds,
    write_registry_features, write_registry_raw,
};
