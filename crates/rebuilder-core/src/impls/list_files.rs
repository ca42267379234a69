//! Outcome logs: line-oriented completed/failed files and an in-memory double

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::domain::{BuildJob, BuildResult};
use crate::ports::{OutcomeLog, RecordError};

/// `completed.list` / `failed.list`, one package per line.
///
/// Both files are truncated when the log is created, so each run starts with
/// an empty record. Lines are appended as jobs finish.
#[derive(Debug, Clone)]
pub struct ListFiles {
    completed: PathBuf,
    failed: PathBuf,
}

impl ListFiles {
    pub async fn create(
        completed: impl Into<PathBuf>,
        failed: impl Into<PathBuf>,
    ) -> Result<Self, RecordError> {
        let lists = Self {
            completed: completed.into(),
            failed: failed.into(),
        };
        for path in [&lists.completed, &lists.failed] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::File::create(path).await?;
        }
        Ok(lists)
    }

    pub fn completed_path(&self) -> &Path {
        &self.completed
    }

    pub fn failed_path(&self) -> &Path {
        &self.failed
    }

    fn path_for(&self, result: BuildResult) -> &Path {
        match result {
            BuildResult::Complete => &self.completed,
            BuildResult::Failed | BuildResult::Cancelled | BuildResult::Deleted => &self.failed,
        }
    }
}

#[async_trait]
impl OutcomeLog for ListFiles {
    async fn record(&self, job: &BuildJob) -> Result<(), RecordError> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.path_for(job.result))
            .await?;
        file.write_all(format!("{}\n", job.package).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Outcome log kept in memory.
#[derive(Default)]
pub struct InMemoryOutcomeLog {
    jobs: Mutex<Vec<BuildJob>>,
}

impl InMemoryOutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<BuildJob> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.packages(|r| r == BuildResult::Complete)
    }

    pub fn failed(&self) -> Vec<String> {
        self.packages(|r| r != BuildResult::Complete)
    }

    fn packages(&self, keep: impl Fn(BuildResult) -> bool) -> Vec<String> {
        self.jobs()
            .into_iter()
            .filter(|job| keep(job.result))
            .map(|job| job.package)
            .collect()
    }
}

#[async_trait]
impl OutcomeLog for InMemoryOutcomeLog {
    async fn record(&self, job: &BuildJob) -> Result<(), RecordError> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn results_land_in_their_list() {
        let dir = tempfile::tempdir().unwrap();
        let lists = ListFiles::create(
            dir.path().join("completed.list"),
            dir.path().join("failed.list"),
        )
        .await
        .unwrap();

        lists.record(&BuildJob::local("a", BuildResult::Complete)).await.unwrap();
        lists.record(&BuildJob::local("b", BuildResult::Failed)).await.unwrap();
        lists.record(&BuildJob::local("c", BuildResult::Cancelled)).await.unwrap();

        let completed = std::fs::read_to_string(lists.completed_path()).unwrap();
        let failed = std::fs::read_to_string(lists.failed_path()).unwrap();
        assert_eq!(completed, "a\n");
        assert_eq!(failed, "b\nc\n");
    }

    #[tokio::test]
    async fn create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let completed = dir.path().join("logs/completed.list");
        let failed = dir.path().join("logs/failed.list");
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(&completed, "old\n").unwrap();

        ListFiles::create(&completed, &failed).await.unwrap();
        assert_eq!(std::fs::read_to_string(&completed).unwrap(), "");
        assert!(failed.exists());
    }
}
