//! Status - dispatch 実行の件数とサマリー

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BuildJob, BuildResult, RunId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub complete: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub deleted: usize,
}

impl RunCounts {
    pub fn add(&mut self, result: BuildResult) {
        match result {
            BuildResult::Complete => self.complete += 1,
            BuildResult::Failed => self.failed += 1,
            BuildResult::Cancelled => self.cancelled += 1,
            BuildResult::Deleted => self.deleted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.complete + self.failed + self.cancelled + self.deleted
    }
}

/// Everything a dispatch run produced, in completion order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub jobs: Vec<BuildJob>,
    /// Largest number of jobs that were in flight at the same time.
    pub peak_in_flight: usize,
}

impl RunReport {
    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts::default();
        for job in &self.jobs {
            counts.add(job.result);
        }
        counts
    }

    pub fn summary(&self, message: impl Into<String>) -> RunSummary {
        RunSummary {
            run_id: Some(self.run_id),
            started_at: self.started_at,
            finished_at: self.finished_at,
            counts: self.counts(),
            message: message.into(),
        }
    }
}

/// The final signal of a run, relayed by the outer process.
///
/// Exists even when the run never got going (`run_id` is then `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Option<RunId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: RunCounts,
    pub message: String,
}

impl RunSummary {
    pub fn aborted(started_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            run_id: None,
            started_at,
            finished_at: Utc::now(),
            counts: RunCounts::default(),
            message: message.into(),
        }
    }

    pub fn headline(&self) -> String {
        format!(
            "{} ({} complete, {} failed, {} cancelled, {} deleted)",
            self.message,
            self.counts.complete,
            self.counts.failed,
            self.counts.cancelled,
            self.counts.deleted
        )
    }
}
