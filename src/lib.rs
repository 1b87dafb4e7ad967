pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod presentation;

pub use application::TriagePipeline;
pub use application::dto::{TriageConfig, TriageReport};
pub use error::TriageError;
