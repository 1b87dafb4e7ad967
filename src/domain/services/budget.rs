//! Extraction budget
//!
//! Caps the number of registry keys recorded. Once the limit is reached every
//! further candidate is skipped; nothing is evicted and nothing is retried.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// How budgets are shared between hives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    /// One budget for the whole run
    #[default]
    PerRun,
    /// A fresh budget for every hive
    PerHive,
}

/// Monotonic counter bounded by an entry limit
#[derive(Debug)]
pub struct ExtractionBudget {
    limit: usize,
    used: AtomicUsize,
}

impl ExtractionBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Claims one slot; returns false once the limit is reached
    pub fn try_acquire(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn is_exhausted(&self) -> bool {
        self.used() >= self.limit
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used())
    }
}
