//! TaskWatcher - 投入済みビルドタスクを終わるまでポーリング
//!
//! # ループ
//! 1. `task_info(task_id)`
//! 2. 終端状態 → 返す
//! 3. それ以外（情報なし、Free/Open/Assigned、未知のコード、一時エラー）
//!    → `poll_interval` 待って繰り返す
//!
//! バックオフもリトライ上限もない。上限は任意の `timeout` と
//! future の破棄（プロセス中断）だけ。

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::seek::first_i64;
use crate::domain::{RemoteError, RemoteTaskId, RemoteTaskState};
use crate::ports::BuildSystem;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("task {task_id} still running after {elapsed:?}")]
    TimedOut {
        task_id: RemoteTaskId,
        elapsed: Duration,
    },

    #[error("task {task_id} could not be polled: {source}")]
    Remote {
        task_id: RemoteTaskId,
        #[source]
        source: RemoteError,
    },
}

pub struct TaskWatcher {
    session: Arc<dyn BuildSystem>,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl TaskWatcher {
    pub fn new(session: Arc<dyn BuildSystem>, poll_interval: Duration) -> Self {
        Self {
            session,
            poll_interval,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until `task_id` reaches Closed, Cancelled or Failed.
    pub async fn watch(&self, task_id: RemoteTaskId) -> Result<RemoteTaskState, WatchError> {
        match self.timeout {
            None => self.poll_until_done(task_id).await,
            Some(limit) => tokio::time::timeout(limit, self.poll_until_done(task_id))
                .await
                .unwrap_or(Err(WatchError::TimedOut {
                    task_id,
                    elapsed: limit,
                })),
        }
    }

    async fn poll_until_done(&self, task_id: RemoteTaskId) -> Result<RemoteTaskState, WatchError> {
        loop {
            if let Some(state) = self.poll_once(task_id).await? {
                if state.is_terminal() {
                    return Ok(state);
                }
                debug!(%task_id, ?state, "task still running");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One status query. `Ok(None)` means "nothing usable this time".
    async fn poll_once(
        &self,
        task_id: RemoteTaskId,
    ) -> Result<Option<RemoteTaskState>, WatchError> {
        let info = match self.session.task_info(task_id).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                debug!(%task_id, "no task info yet");
                return Ok(None);
            }
            Err(e) if e.is_transient() => {
                warn!(%task_id, error = %e, "task poll failed, retrying next tick");
                return Ok(None);
            }
            Err(source) => return Err(WatchError::Remote { task_id, source }),
        };

        let Some(code) = first_i64(&info, "state") else {
            warn!(%task_id, "task info carries no state");
            return Ok(None);
        };
        let state = RemoteTaskState::from_code(code);
        if state.is_none() {
            warn!(%task_id, code, "unknown task state code");
        }
        Ok(state)
    }
}
