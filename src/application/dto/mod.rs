//! Data Transfer Objects

mod triage_config;
mod triage_report;

pub use triage_config::{
    AnomalyOptions, ConfigError, ContainerOptions, ExportOptions, RegistryOptions,
    TraversalStart, TriageConfig, WalkerOptions,
};
pub use triage_report::{HiveOutcome, HiveStatus, RegistryStatistics, TriageReport};
