//! State - hub が報告するタスク状態とビルド状態
//!
//! どちらの enum も hub の整数コードに対応する。未知のコードは `None` になり、
//! 新しい hub の値を終端状態と取り違えることはない。

use serde::{Deserialize, Serialize};

use super::result::BuildResult;

/// RemoteTaskState は投入済みビルドタスクのライフサイクル
///
/// # 状態遷移
/// - Free -> Open -> Closed
/// - Free -> Assigned -> Open -> Failed / Cancelled
///
/// Closed, Cancelled, Failed が終端状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteTaskState {
    Free,
    Open,
    Closed,
    Cancelled,
    Assigned,
    Failed,
}

impl RemoteTaskState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Free),
            1 => Some(Self::Open),
            2 => Some(Self::Closed),
            3 => Some(Self::Cancelled),
            4 => Some(Self::Assigned),
            5 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Free => 0,
            Self::Open => 1,
            Self::Closed => 2,
            Self::Cancelled => 3,
            Self::Assigned => 4,
            Self::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled | Self::Failed)
    }

    /// Terminal states map onto a [`BuildResult`]; anything still moving does not.
    pub fn build_result(self) -> Option<BuildResult> {
        match self {
            Self::Closed => Some(BuildResult::Complete),
            Self::Cancelled => Some(BuildResult::Cancelled),
            Self::Failed => Some(BuildResult::Failed),
            Self::Free | Self::Open | Self::Assigned => None,
        }
    }
}

/// BuildState はビルドレコードの状態（タスクではない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildState {
    Building,
    Complete,
    Deleted,
    Failed,
    Cancelled,
}

impl BuildState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Building),
            1 => Some(Self::Complete),
            2 => Some(Self::Deleted),
            3 => Some(Self::Failed),
            4 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Building => 0,
            Self::Complete => 1,
            Self::Deleted => 2,
            Self::Failed => 3,
            Self::Cancelled => 4,
        }
    }
}
