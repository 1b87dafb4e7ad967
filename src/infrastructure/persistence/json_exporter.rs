//! JSON exporter
//!
//! Writes pretty-printed UTF-8 JSON documents into the case output
//! directory. Arrays keep their insertion order.

use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const ANALYSIS_RESULTS_FILE: &str = "analysis_results.json";
pub const ANOMALIES_FILE: &str = "anomalies.json";
pub const REGISTRY_FULL_FILE: &str = "registry_full.json";
pub const REGISTRY_ANOMALIES_FILE: &str = "registry_anomalies.json";
pub const IMAGE_METADATA_FILE: &str = "disk_image_metadata.json";

/// Errors that can occur while exporting results
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ExportError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Writes JSON documents under one output directory
#[derive(Debug, Clone)]
pub struct JsonExporter {
    output_dir: PathBuf,
}

impl JsonExporter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Serializes `value` to `<output_dir>/<file_name>`
    pub fn write<T: Serialize + ?Sized>(
        &self,
        file_name: &str,
        value: &T,
    ) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| ExportError::io(&self.output_dir, e))?;
        let path = self.output_dir.join(file_name);
        let file = File::create(&path).map_err(|e| ExportError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(|e| ExportError::io(&path, e))?;
        info!("Wrote {}", path.display());
        Ok(path)
    }
}
