//! Crate-level error type

use crate::application::WalkError;
use crate::application::dto::ConfigError;
use crate::domain::repositories::{ArtifactWriteError, FileSystemError, HiveError};
use crate::domain::services::ContainerError;
use crate::infrastructure::persistence::ExportError;
use thiserror::Error;

/// Any error that can end a triage run
#[derive(Error, Debug)]
pub enum TriageError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Hive(#[from] HiveError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Write(#[from] ArtifactWriteError),
}

pub type Result<T> = std::result::Result<T, TriageError>;
