//! ArtifactStore port - 上流パッケージストアからビルド済み RPM を取得

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("server answered {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request for {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("download timed out: {0}")]
    Timeout(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// ArtifactStore は成果物 1 つをローカルパスにダウンロードする
///
/// # 前提
/// - 呼び出し時点で保存先の親ディレクトリは存在する
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}
