//! CLI module

mod commands;
mod logging;
mod progress;

pub use commands::{
    AnomalyArgs, Cli, Commands, ContainerArgs, RegistryArgs, ScopeArg, WalkArgs,
};
pub use logging::{default_filter, init_logging};
pub use progress::ProgressReporter;
