//! BuildSystem port - 上流または下流の hub に対する 1 セッション
//!
//! エンジンはワイヤプロトコルを見ない。hub は呼び出しごとに行の入れ子が異なるため、
//! 問い合わせ結果は型なし JSON で返り、呼び出し元が [`crate::domain::seek`] で
//! フィールドを取り出す。
//!
//! # 実装
//! - **JsonRpcBuildSystem**: reqwest ベースの gateway クライアント
//! - **InMemoryBuildSystem**: テスト用のスクリプト可能な実装

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{RemoteError, RemoteTaskId};

/// How a build record is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildRef<'a> {
    Id(i64),
    Nvr(&'a str),
}

/// BuildSystem は再ビルドコアが hub に求める能力の契約
///
/// # 並行性
/// - 実行中のすべての再ビルドが `Arc` 経由で共有する
/// - 更新系の呼び出し（タグ登録、投入、import）は並行に発行してよい。
///   ロックは hub 側が行う
#[async_trait]
pub trait BuildSystem: Send + Sync {
    /// Whether the session currently holds valid credentials.
    async fn is_authenticated(&self) -> Result<bool, RemoteError>;

    async fn login(&self) -> Result<(), RemoteError>;

    /// Latest RPM and build rows of `package` under `tag`.
    ///
    /// An empty answer (`[[], []]`) is not an error.
    async fn latest_rpms(&self, tag: &str, package: &str) -> Result<Value, RemoteError>;

    async fn get_build(&self, build: BuildRef<'_>) -> Result<Option<Value>, RemoteError>;

    /// Inheritance rows of `tag`; parents carry a `name` field.
    async fn inheritance(&self, tag: &str) -> Result<Value, RemoteError>;

    async fn has_tag_package(&self, tag: &str, package: &str) -> Result<bool, RemoteError>;

    /// Add `package` to the package list of `tag`. Idempotent.
    async fn add_tag_package(&self, tag: &str, package: &str) -> Result<(), RemoteError>;

    async fn submit_build(&self, source: &str, target: &str) -> Result<RemoteTaskId, RemoteError>;

    /// Task info, or `None` while the hub has nothing to say about the task yet.
    async fn task_info(&self, task_id: RemoteTaskId) -> Result<Option<Value>, RemoteError>;

    /// Upload a local file into `server_dir` on the hub's staging area.
    async fn upload(&self, local: &Path, server_dir: &str) -> Result<(), RemoteError>;

    async fn import_rpm(&self, server_dir: &str, file_name: &str) -> Result<(), RemoteError>;

    /// Build rows that are not tagged anywhere yet.
    async fn untagged_builds(&self) -> Result<Value, RemoteError>;

    async fn tag_build(&self, tag: &str, nvr: &str) -> Result<(), RemoteError>;

    /// Number of enabled hosts for `arch` that are ready to take a job.
    async fn ready_hosts(&self, arch: &str) -> Result<usize, RemoteError>;
}
