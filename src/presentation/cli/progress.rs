//! Progress reporting for CLI

use crate::application::dto::{HiveOutcome, HiveStatus};
use crate::domain::entities::FilesystemEntry;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// Progress reporter using indicatif
pub struct ProgressReporter {
    bar: Arc<ProgressBar>,
}

fn style(template: &str, fallback: ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or(fallback)
}

impl ProgressReporter {
    /// Spinner counting walked entries; the total is unknown up front
    pub fn for_walk() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(style(
            "{spinner:.green} [{elapsed_precise}] {pos} entries | {wide_msg}",
            ProgressStyle::default_spinner(),
        ));
        bar.set_message("Walking filesystem...".to_string());
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar: Arc::new(bar) }
    }

    /// Bar over the number of hives expected
    pub fn for_hives(expected: u64) -> Self {
        let bar = ProgressBar::new(expected);
        bar.set_style(
            style(
                "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} hives",
                ProgressStyle::default_bar(),
            )
            .progress_chars("#>-"),
        );
        bar.set_message("Extracting registry hives...".to_string());

        Self { bar: Arc::new(bar) }
    }

    /// A reporter that draws nothing, for `--quiet`
    pub fn hidden() -> Self {
        Self {
            bar: Arc::new(ProgressBar::hidden()),
        }
    }

    /// Finishes with a message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Gets a callback for walked entries
    pub fn entry_callback(&self) -> Box<dyn Fn(&FilesystemEntry) + Send + Sync> {
        let bar = Arc::clone(&self.bar);
        Box::new(move |entry: &FilesystemEntry| {
            bar.inc(1);
            if entry.is_directory() {
                bar.set_message(entry.path.clone());
            }
        })
    }

    /// Gets a callback for finished hives
    pub fn hive_callback(&self) -> Box<dyn Fn(&HiveOutcome) + Send + Sync> {
        let bar = Arc::clone(&self.bar);
        Box::new(move |outcome: &HiveOutcome| {
            // walker-found hives arrive past the expected count
            if let Some(len) = bar.length() {
                if bar.position() >= len {
                    bar.inc_length(1);
                }
                bar.inc(1);
            }
            if let HiveStatus::Extracted { records } = outcome.status {
                bar.set_message(format!("{}: {} keys", outcome.hive, records));
            } else {
                bar.set_message(format!("{}: {}", outcome.hive, outcome.status));
            }
        })
    }
}
