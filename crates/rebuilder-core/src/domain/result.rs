//! Result - 1 回の再ビルドの終着点（BuildResult, BuildJob）

use serde::{Deserialize, Serialize};
use std::fmt;

/// BuildResult は 1 パッケージの再ビルドの終端結果
///
/// 保留中の variant はない。呼び出し元がジョブを見るのは終了後だけ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Complete,
    Failed,
    Cancelled,
    /// Only reachable when the hub reports the build deleted.
    Deleted,
}

impl BuildResult {
    /// Deleted builds are reported as failures.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Deleted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a task on the downstream hub.
///
/// `-1` (see [`RemoteTaskId::NONE`]) means no task was created: fast-track
/// imports, duplicates and early failures all carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteTaskId(i64);

impl RemoteTaskId {
    pub const NONE: RemoteTaskId = RemoteTaskId(-1);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Only positive ids name a real task.
    pub fn exists(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for RemoteTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// BuildJob は終了した再ビルド 1 回：`(package, task id, result)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    pub package: String,
    pub task_id: RemoteTaskId,
    pub result: BuildResult,
}

impl BuildJob {
    pub fn new(package: impl Into<String>, task_id: RemoteTaskId, result: BuildResult) -> Self {
        Self {
            package: package.into(),
            task_id,
            result,
        }
    }

    /// A result reached without creating a remote task.
    pub fn local(package: impl Into<String>, result: BuildResult) -> Self {
        Self::new(package, RemoteTaskId::NONE, result)
    }
}
