//! CLI commands using clap

use crate::application::dto::TriageConfig;
use crate::domain::services::{BadChunkPolicy, BudgetScope, DuplicatePolicy};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Evidence triage
///
/// Walks a filesystem mounted from a disk-evidence container, extracts
/// registry hives and flags anomalous entries.
#[derive(Parser)]
#[command(name = "triage")]
#[command(version)]
#[command(about = "Triage disk-evidence containers", long_about = None)]
pub struct Cli {
    /// Enable debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full triage pipeline
    ///
    /// Files and hives are read from the host mount directory given with
    /// --mount. The evidence container is not decoded: it only supplies
    /// image metadata, the filesystem type check and bad-chunk reporting.
    Run {
        /// Container directory or first segment (e.g. case.E01); read for
        /// metadata, filesystem detection and bad chunks only
        #[arg(short, long)]
        evidence: Option<PathBuf>,

        /// Host directory the container's filesystem is mounted on; all
        /// walked files and hives come from here
        #[arg(short, long)]
        mount: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "./triage_output")]
        output: PathBuf,

        #[command(flatten)]
        container: ContainerArgs,

        #[command(flatten)]
        walk: WalkArgs,

        #[command(flatten)]
        registry: RegistryArgs,

        #[command(flatten)]
        anomaly: AnomalyArgs,
    },

    /// Walk a mounted filesystem and flag anomalies
    Walk {
        /// Directory the container's filesystem is mounted on
        #[arg(short, long)]
        mount: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "./triage_output")]
        output: PathBuf,

        #[command(flatten)]
        walk: WalkArgs,

        #[command(flatten)]
        anomaly: AnomalyArgs,
    },

    /// Extract registry hives from a mounted filesystem or a hive file
    Registry {
        /// Directory the container's filesystem is mounted on
        #[arg(short, long, required_unless_present = "hive")]
        mount: Option<PathBuf>,

        /// Process one local hive file instead
        #[arg(long, conflicts_with = "mount")]
        hive: Option<PathBuf>,

        /// Hive name for --hive (SYSTEM, SOFTWARE, NTUSER_<user>, ...)
        #[arg(long, requires = "hive")]
        name: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "./registry-entries")]
        output: PathBuf,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Show evidence container information
    Info {
        /// Container directory or first segment
        #[arg(short, long)]
        evidence: PathBuf,
    },

    /// Turn a raw registry CSV into the numeric feature table
    Clean {
        /// Input `registry_raw.csv`
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV
        #[arg(short, long, default_value = "registry_cleaned.csv")]
        output: PathBuf,
    },

    /// Print the effective configuration as JSON
    Config,
}

/// Container read flags
#[derive(Args, Debug, Clone, Default)]
pub struct ContainerArgs {
    /// Read chunk size in KiB
    #[arg(long)]
    pub chunk_kib: Option<usize>,

    /// Zero-fill only the failing chunk and keep reading
    #[arg(long)]
    pub skip_bad_chunks: bool,
}

impl ContainerArgs {
    pub fn apply(&self, config: &mut TriageConfig) {
        if let Some(kib) = self.chunk_kib {
            config.container.chunk_size = kib * 1024;
        }
        if self.skip_bad_chunks {
            config.container.bad_chunk_policy = BadChunkPolicy::SkipBadChunk;
        }
    }
}

/// Filesystem walk flags
#[derive(Args, Debug, Clone, Default)]
pub struct WalkArgs {
    /// Directory inside the mount to start at
    #[arg(long)]
    pub root: Option<String>,

    /// Deepest directory level descended into
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Do not copy log files out
    #[arg(long)]
    pub no_logs: bool,

    /// Copy hive files found while walking and extract them too
    #[arg(long)]
    pub capture_hives: bool,
}

impl WalkArgs {
    pub fn apply(&self, config: &mut TriageConfig) {
        if let Some(root) = &self.root {
            config.walker.root = root.clone();
        }
        if let Some(depth) = self.max_depth {
            config.walker.max_depth = depth;
        }
        if self.no_logs {
            config.walker.capture_logs = false;
        }
        if self.capture_hives {
            config.walker.capture_hives = true;
        }
    }
}

/// Budget scope as a flag value
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeArg {
    PerRun,
    PerHive,
}

impl From<ScopeArg> for BudgetScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::PerRun => Self::PerRun,
            ScopeArg::PerHive => Self::PerHive,
        }
    }
}

/// Registry extraction flags
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Maximum number of key records
    #[arg(long)]
    pub entry_limit: Option<usize>,

    /// Deepest key level below each start key
    #[arg(long)]
    pub key_depth: Option<usize>,

    /// Whether the entry limit is shared by all hives or reset per hive
    #[arg(long, value_enum)]
    pub budget_scope: Option<ScopeArg>,

    /// Skip NTUSER.DAT hives
    #[arg(long)]
    pub no_user_hives: bool,

    /// Traverse hives in parallel
    #[arg(long)]
    pub parallel_hives: bool,

    /// Skip registry extraction entirely
    #[arg(long)]
    pub no_registry: bool,
}

impl RegistryArgs {
    pub fn apply(&self, config: &mut TriageConfig) {
        if let Some(limit) = self.entry_limit {
            config.registry.entry_limit = limit;
        }
        if let Some(depth) = self.key_depth {
            config.registry.max_depth = depth;
        }
        if let Some(scope) = self.budget_scope {
            config.registry.budget_scope = scope.into();
        }
        if self.no_user_hives {
            config.registry.include_user_hives = false;
        }
        if self.parallel_hives {
            config.registry.parallel_hives = true;
        }
        if self.no_registry {
            config.registry.enabled = false;
        }
    }
}

/// Anomaly detection flags
#[derive(Args, Debug, Clone, Default)]
pub struct AnomalyArgs {
    /// Standard deviations from the mean before a size is unusual
    #[arg(long)]
    pub size_threshold: Option<f64>,

    /// Emit one anomaly per record with reasons joined
    #[arg(long)]
    pub merge_reasons: bool,
}

impl AnomalyArgs {
    pub fn apply(&self, config: &mut TriageConfig) {
        if let Some(threshold) = self.size_threshold {
            config.anomaly.size_threshold = threshold;
        }
        if self.merge_reasons {
            config.anomaly.duplicate_policy = DuplicatePolicy::Merge;
        }
    }
}
