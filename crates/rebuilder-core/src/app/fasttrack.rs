//! FastTrackImporter - ビルド済みのアーキテクチャ非依存 RPM を下流へ再 import
//!
//! # フロー
//! 1. 解決済みタグでの最新上流ビルドの RPM 行を列挙
//! 2. 各 RPM を `<download_dir>/<package>/` にダウンロード
//! 3. 下流 hub の新しいステージングディレクトリにアップロードし、import
//! 4. 生成された未タグのビルドを下流タグに付ける
//! 5. 結果にかかわらずローカルディレクトリを削除（有効時）

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::RemoteError;
use crate::domain::seek::{records_with, seek};
use crate::ports::{ArtifactStore, BuildSystem, FetchError};

/// Arches that carry no machine code.
const ARCH_INDEPENDENT: [&str; 2] = ["src", "noarch"];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no rpm rows for {package} under {tag}")]
    NoArtifacts { package: String, tag: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Root of the upstream package store.
    pub topurl: String,
    pub download_dir: PathBuf,
    pub prune: bool,
}

/// One RPM to fetch: where from and the local file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub url: String,
    pub file_name: String,
}

/// True when there is at least one row and every row is `src` or `noarch`.
pub fn all_arch_independent(rows: &Value) -> bool {
    let mut arches = seek(rows, "arch").peekable();
    arches.peek().is_some()
        && arches.all(|arch| arch.as_str().is_some_and(|a| ARCH_INDEPENDENT.contains(&a)))
}

/// `<topurl>/<pkg>/<version>/<release>/<arch>/<name>-<version>-<release>.<arch>.rpm`
/// for every complete RPM row. Rows missing a field are skipped.
pub fn artifact_urls(rows: &Value, topurl: &str, package: &str) -> Vec<Artifact> {
    let topurl = topurl.trim_end_matches('/');
    records_with(rows, "arch")
        .filter_map(|row| {
            let field = |key: &str| row.get(key).and_then(Value::as_str);
            let (name, version, release, arch) =
                (field("name")?, field("version")?, field("release")?, field("arch")?);
            let file_name = format!("{name}-{version}-{release}.{arch}.rpm");
            Some(Artifact {
                url: format!("{topurl}/{package}/{version}/{release}/{arch}/{file_name}"),
                file_name,
            })
        })
        .collect()
}

/// Fresh staging dir on the hub: `app-import/<unix-ts>.<8 random letters>`.
pub fn unique_server_dir() -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect();
    format!("app-import/{}.{suffix}", Utc::now().timestamp())
}

pub struct FastTrackImporter {
    upstream: Arc<dyn BuildSystem>,
    downstream: Arc<dyn BuildSystem>,
    store: Arc<dyn ArtifactStore>,
    options: ImportOptions,
}

impl FastTrackImporter {
    pub fn new(
        upstream: Arc<dyn BuildSystem>,
        downstream: Arc<dyn BuildSystem>,
        store: Arc<dyn ArtifactStore>,
        options: ImportOptions,
    ) -> Self {
        Self {
            upstream,
            downstream,
            store,
            options,
        }
    }

    /// Whether the latest upstream build of `package` under `tag` is
    /// entirely arch-independent.
    pub async fn is_eligible(&self, tag: &str, package: &str) -> Result<bool, RemoteError> {
        let rows = self.upstream.latest_rpms(tag, package).await?;
        Ok(all_arch_independent(&rows))
    }

    pub async fn import(
        &self,
        package: &str,
        up_tag: &str,
        down_tag: &str,
    ) -> Result<(), ImportError> {
        let dir = self.options.download_dir.join(package);
        let outcome = self.import_into(&dir, package, up_tag, down_tag).await;
        if self.options.prune {
            prune(&dir).await;
        }
        outcome
    }

    /// Drop whatever an abandoned import left behind.
    pub async fn discard(&self, package: &str) {
        if self.options.prune {
            prune(&self.options.download_dir.join(package)).await;
        }
    }

    async fn import_into(
        &self,
        dir: &Path,
        package: &str,
        up_tag: &str,
        down_tag: &str,
    ) -> Result<(), ImportError> {
        let rows = self.upstream.latest_rpms(up_tag, package).await?;
        let mut artifacts = artifact_urls(&rows, &self.options.topurl, package);
        if artifacts.is_empty() {
            return Err(ImportError::NoArtifacts {
                package: package.to_string(),
                tag: up_tag.to_string(),
            });
        }
        artifacts.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        artifacts.dedup();

        tokio::fs::create_dir_all(dir).await?;
        for artifact in &artifacts {
            debug!(package, url = %artifact.url, "downloading");
            self.store.download(&artifact.url, &dir.join(&artifact.file_name)).await?;
        }

        let server_dir = unique_server_dir();
        for artifact in &artifacts {
            self.downstream.upload(&dir.join(&artifact.file_name), &server_dir).await?;
            self.downstream.import_rpm(&server_dir, &artifact.file_name).await?;
        }

        let untagged = self.downstream.untagged_builds().await?;
        for build in records_with(&untagged, "nvr") {
            if build.get("name").and_then(Value::as_str) != Some(package) {
                continue;
            }
            if let Some(nvr) = build.get("nvr").and_then(Value::as_str) {
                self.downstream.tag_build(down_tag, nvr).await?;
            }
        }

        info!(package, tag = down_tag, rpms = artifacts.len(), "imported prebuilt rpms");
        Ok(())
    }
}

async fn prune(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "could not prune download dir"),
    }
}
