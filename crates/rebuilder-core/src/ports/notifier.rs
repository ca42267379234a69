//! Notifier port - ビルド通知と実行サマリーを配送手段へ渡す
//!
//! 送るかどうかは [`crate::app::policy::NotificationPolicy`] が決める。
//! 配送手段は届けるだけ。
//!
//! # 実装
//! - **LogNotifier**: tracing ログに書く
//! - **RecordingNotifier**: すべて保持する（テスト用）

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::app::status::RunSummary;
use crate::domain::BuildResult;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// One package's result as seen by a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildNotice {
    pub package: String,
    pub result: BuildResult,
    pub task_url: Option<String>,
}

impl BuildNotice {
    pub fn subject(&self) -> String {
        let status = if self.result.is_failure() { "FAILED" } else { "COMPLETED" };
        format!("Build System Status: {status}")
    }

    pub fn body(&self) -> String {
        let mut msg = format!("Package {} build {}.", self.package, self.result);
        if let Some(url) = &self.task_url {
            msg.push_str(&format!(" Logs available at {url}"));
        }
        msg
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn build_notice(&self, notice: &BuildNotice) -> Result<(), NotifyError>;

    /// Final signal of a run, with the files worth attaching.
    async fn run_finished(
        &self,
        summary: &RunSummary,
        attachments: &[PathBuf],
    ) -> Result<(), NotifyError>;
}
