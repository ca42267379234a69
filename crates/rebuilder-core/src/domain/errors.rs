//! Errors - リモート呼び出しの失敗と分類

use thiserror::Error;

/// ErrorKind はリモート失敗の分類（呼び出し元のリトライ判断用）
///
/// # 分類
/// - Transient: 一時的なエラー（タイムアウト、切断。リトライ推奨）
/// - Permanent: hub が拒否した（fault、不正な引数。リトライ無意味）
/// - Infrastructure: ローカル側の障害（認証なし、不正なエンドポイント）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// RemoteError は上流・下流 hub との通信失敗全般
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("hub fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote call timed out")]
    Timeout,

    #[error("session is not authenticated")]
    NotAuthenticated,

    #[error("unexpected response for {method}: {detail}")]
    Malformed { method: String, detail: String },

    #[error("local io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Transport(_) | RemoteError::Timeout => ErrorKind::Transient,
            RemoteError::Fault { .. } | RemoteError::Malformed { .. } => ErrorKind::Permanent,
            RemoteError::NotAuthenticated | RemoteError::Io(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn malformed(method: &str, detail: impl Into<String>) -> Self {
        RemoteError::Malformed {
            method: method.to_string(),
            detail: detail.into(),
        }
    }
}
