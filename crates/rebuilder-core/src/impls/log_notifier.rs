//! Notifier implementations: a tracing-backed transport and a recording double

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::app::status::RunSummary;
use crate::ports::{BuildNotice, Notifier, NotifyError};

/// Writes notices to the log instead of mailing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn build_notice(&self, notice: &BuildNotice) -> Result<(), NotifyError> {
        if notice.result.is_failure() {
            warn!(subject = %notice.subject(), "{}", notice.body());
        } else {
            info!(subject = %notice.subject(), "{}", notice.body());
        }
        Ok(())
    }

    async fn run_finished(
        &self,
        summary: &RunSummary,
        attachments: &[PathBuf],
    ) -> Result<(), NotifyError> {
        let files: Vec<String> = attachments.iter().map(|p| p.display().to_string()).collect();
        info!(
            run_id = ?summary.run_id.map(|id| id.to_string()),
            attachments = ?files,
            "{}",
            summary.headline()
        );
        Ok(())
    }
}

/// Keeps every notice and summary for later inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<BuildNotice>>,
    summaries: Mutex<Vec<(RunSummary, Vec<PathBuf>)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<BuildNotice> {
        self.notices.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn summaries(&self) -> Vec<(RunSummary, Vec<PathBuf>)> {
        self.summaries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn build_notice(&self, notice: &BuildNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notice.clone());
        Ok(())
    }

    async fn run_finished(
        &self,
        summary: &RunSummary,
        attachments: &[PathBuf],
    ) -> Result<(), NotifyError> {
        self.summaries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((summary.clone(), attachments.to_vec()));
        Ok(())
    }
}
