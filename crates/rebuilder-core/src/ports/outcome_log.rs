//! OutcomeLog port - 実行ごとの completed/failed の永続記録
//!
//! 最後にまとめてではなくジョブが終わるたびに書くので、中断された実行でも
//! 正確な途中記録が残る。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::BuildJob;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// OutcomeLog は終了ジョブを completed か failed に振り分けて記録する
///
/// completed になるのは `Complete` だけ。それ以外の結果はすべて failed に入る。
#[async_trait]
pub trait OutcomeLog: Send + Sync {
    async fn record(&self, job: &BuildJob) -> Result<(), RecordError>;
}
