//! Application layer
//!
//! Use cases that orchestrate domain logic over the infrastructure adapters.

pub mod dto;
mod extract_registry;
mod run_triage;
mod walk_filesystem;

pub use extract_registry::{
    HiveProgressCallback, HiveResolution, MIN_HIVE_SIZE, RegistryExtraction,
    RegistryHiveExtractor, ResolvedHive, verify_hive_integrity,
};
pub use run_triage::{EntryProgressCallback, HiveDoneCallback, TriagePipeline};
pub use walk_filesystem::{
    ArtifactRoute, ArtifactWalker, CaptureRoutes, CapturedArtifact, HiveCandidate, LOGS_DIR,
    REGISTRY_DIR, WalkError, WalkOutcome, flatten_path,
};
