//! Progress reporting and per-item outcome collection for batch steps.

use tracing::{info, warn};

/// Logs the percentage of utterances processed whenever it advances.
#[derive(Debug)]
pub struct Progress {
    step: &'static str,
    total: usize,
    done: usize,
    last_percent: Option<usize>,
}

impl Progress {
    pub fn new(step: &'static str, total: usize) -> Self {
        Self {
            step,
            total,
            done: 0,
            last_percent: None,
        }
    }

    /// Mark one more item as processed; returns the current percentage.
    pub fn advance(&mut self) -> usize {
        self.done = (self.done + 1).min(self.total.max(1));
        let percent = self.percent();
        if self.last_percent != Some(percent) {
            info!(step = self.step, percent, done = self.done, total = self.total, "progress");
            self.last_percent = Some(percent);
        }
        percent
    }

    pub fn percent(&self) -> usize {
        if self.total == 0 {
            100
        } else {
            self.done * 100 / self.total
        }
    }
}

/// Outcome of one batch step where items fail independently.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    /// `(basename, reason)`
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn record<T, E: std::fmt::Display>(&mut self, basename: &str, outcome: Result<T, E>) {
        match outcome {
            Ok(_) => self.succeeded.push(basename.to_string()),
            Err(e) => {
                warn!(basename, error = %e, "skipping basename");
                self.failed.push((basename.to_string(), e.to_string()));
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Basenames that were skipped.
    pub fn skipped(&self) -> Vec<&str> {
        self.failed.iter().map(|(b, _)| b.as_str()).collect()
    }

    /// Log the end-of-step summary.
    pub fn log_summary(&self, step: &str) {
        if self.is_clean() {
            info!(step, processed = self.succeeded.len(), "all basenames processed");
        } else {
            warn!(
                step,
                processed = self.succeeded.len(),
                skipped = self.failed.len(),
                basenames = ?self.skipped(),
                "some basenames were skipped"
            );
        }
    }
}
