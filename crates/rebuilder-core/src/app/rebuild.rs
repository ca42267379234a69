//! RebuildEngine - 1 パッケージを backlog の項目から終端結果まで進める
//!
//! # 状態
//! Start -> Unavailable | FastTrackImport | SourceBuild -> Complete | Failed | Cancelled
//!
//! # フロー
//! 1. 上流タグを解決（親タグへのフォールバックは 1 回）
//! 2. 下流タグにパッケージが登録されていることを保証
//! 3. 下流に同じ NVR があれば Complete で打ち切り
//! 4. [`Strategy`] を選び [`RebuildEngine::execute`] で実行
//!
//! エンジン配下のリモート失敗はすべて `Failed` ジョブになる。
//! [`RebuildEngine::rebuild`] が返すエラーは契約違反だけ：
//! 下流セッションの認証前に実行した場合。

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::dedup::DuplicateDetector;
use super::fasttrack::{FastTrackImporter, ImportOptions};
use super::resolver::PackageResolver;
use super::watcher::{DEFAULT_POLL_INTERVAL, TaskWatcher};
use crate::domain::seek::{first_i64, first_str};
use crate::domain::{BuildJob, BuildResult, RemoteError};
use crate::ports::{ArtifactStore, BuildRef, BuildSystem};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("downstream session is not authenticated")]
    NotAuthenticated,

    #[error("could not check downstream session: {0}")]
    Session(#[source] RemoteError),
}

/// What happens when a fast-track import outlives `import_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportTimeoutPolicy {
    #[default]
    Fail,
    /// Try one source build instead.
    SourceBuild,
}

/// How a package gets rebuilt once it is known to need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FastTrackImport,
    SourceBuild,
}

#[derive(Debug, Clone)]
pub struct RebuildOptions {
    pub upstream_tag: String,
    pub downstream_tag: String,
    /// Downstream build target handed to `submit_build`.
    pub target: String,
    pub fast_track: bool,
    pub poll_interval: Duration,
    pub watch_timeout: Option<Duration>,
    pub import_timeout: Option<Duration>,
    pub on_import_timeout: ImportTimeoutPolicy,
    pub import: ImportOptions,
}

impl RebuildOptions {
    pub fn new(
        upstream_tag: impl Into<String>,
        downstream_tag: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            upstream_tag: upstream_tag.into(),
            downstream_tag: downstream_tag.into(),
            target: target.into(),
            fast_track: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            watch_timeout: None,
            import_timeout: None,
            on_import_timeout: ImportTimeoutPolicy::Fail,
            import: ImportOptions {
                topurl: "https://kojipkgs.fedoraproject.org/packages".to_string(),
                download_dir: PathBuf::from(".rpms"),
                prune: true,
            },
        }
    }
}

pub struct RebuildEngine {
    upstream: Arc<dyn BuildSystem>,
    downstream: Arc<dyn BuildSystem>,
    resolver: PackageResolver,
    detector: DuplicateDetector,
    importer: FastTrackImporter,
    watcher: TaskWatcher,
    options: RebuildOptions,
    authenticated: AtomicBool,
}

impl RebuildEngine {
    pub fn new(
        upstream: Arc<dyn BuildSystem>,
        downstream: Arc<dyn BuildSystem>,
        store: Arc<dyn ArtifactStore>,
        options: RebuildOptions,
    ) -> Self {
        Self {
            resolver: PackageResolver::new(upstream.clone(), options.upstream_tag.clone()),
            detector: DuplicateDetector::new(upstream.clone(), downstream.clone()),
            importer: FastTrackImporter::new(
                upstream.clone(),
                downstream.clone(),
                store,
                options.import.clone(),
            ),
            watcher: TaskWatcher::new(downstream.clone(), options.poll_interval)
                .with_timeout(options.watch_timeout),
            upstream,
            downstream,
            options,
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &RebuildOptions {
        &self.options
    }

    /// Check the downstream session, logging in once if needed.
    pub async fn authenticate(&self) -> Result<(), EngineError> {
        let logged_in = self
            .downstream
            .is_authenticated()
            .await
            .map_err(EngineError::Session)?;
        if !logged_in {
            match self.downstream.login().await {
                Ok(()) => info!("logged in to downstream hub"),
                Err(RemoteError::NotAuthenticated) => return Err(EngineError::NotAuthenticated),
                Err(e) => return Err(EngineError::Session(e)),
            }
        }
        self.authenticated.store(true, Ordering::Release);
        Ok(())
    }

    /// Rebuild one package. Always yields a terminal job once authenticated.
    pub async fn rebuild(&self, package: &str) -> Result<BuildJob, EngineError> {
        if !self.authenticated.load(Ordering::Acquire) {
            return Err(EngineError::NotAuthenticated);
        }
        let job = match self.drive(package).await {
            Ok(job) => job,
            Err(e) => {
                warn!(package, error = %e, "remote call failed, marking package failed");
                BuildJob::local(package, BuildResult::Failed)
            }
        };
        Ok(job)
    }

    async fn drive(&self, package: &str) -> Result<BuildJob, RemoteError> {
        let Some(tag) = self.resolver.resolve_tag(package).await? else {
            warn!(
                package,
                tag = %self.options.upstream_tag,
                "no upstream builds under tag or its parent"
            );
            return Ok(BuildJob::local(package, BuildResult::Failed));
        };

        self.register(package).await?;

        if self
            .detector
            .already_built(package, &tag, &self.options.downstream_tag)
            .await?
        {
            info!(package, "already built downstream, skipping");
            return Ok(BuildJob::local(package, BuildResult::Complete));
        }

        let strategy = self.choose_strategy(&tag, package).await?;
        self.execute(strategy, package, &tag).await
    }

    async fn register(&self, package: &str) -> Result<(), RemoteError> {
        let tag = &self.options.downstream_tag;
        if !self.downstream.has_tag_package(tag, package).await? {
            self.downstream.add_tag_package(tag, package).await?;
            info!(package, tag = %tag, "added package to downstream tag");
        }
        Ok(())
    }

    pub async fn choose_strategy(&self, tag: &str, package: &str) -> Result<Strategy, RemoteError> {
        if self.options.fast_track && self.importer.is_eligible(tag, package).await? {
            Ok(Strategy::FastTrackImport)
        } else {
            Ok(Strategy::SourceBuild)
        }
    }

    /// Run `strategy` for `package`, resolved under upstream `tag`.
    pub async fn execute(
        &self,
        strategy: Strategy,
        package: &str,
        tag: &str,
    ) -> Result<BuildJob, RemoteError> {
        match strategy {
            Strategy::FastTrackImport => self.fast_track(package, tag).await,
            Strategy::SourceBuild => self.source_build(package, tag).await,
        }
    }

    async fn fast_track(&self, package: &str, tag: &str) -> Result<BuildJob, RemoteError> {
        info!(package, tag, "fast-tracking arch-independent build");
        let import = self.importer.import(package, tag, &self.options.downstream_tag);
        let outcome = match self.options.import_timeout {
            None => import.await,
            Some(limit) => match tokio::time::timeout(limit, import).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.importer.discard(package).await;
                    return match self.options.on_import_timeout {
                        ImportTimeoutPolicy::Fail => {
                            warn!(package, ?limit, "import timed out");
                            Ok(BuildJob::local(package, BuildResult::Failed))
                        }
                        ImportTimeoutPolicy::SourceBuild => {
                            warn!(
                                package,
                                ?limit,
                                "import timed out, falling back to source build"
                            );
                            self.source_build(package, tag).await
                        }
                    };
                }
            },
        };

        match outcome {
            Ok(()) => Ok(BuildJob::local(package, BuildResult::Complete)),
            Err(e) => {
                warn!(package, error = %e, "fast-track import failed");
                Ok(BuildJob::local(package, BuildResult::Failed))
            }
        }
    }

    async fn source_build(&self, package: &str, tag: &str) -> Result<BuildJob, RemoteError> {
        let Some(source) = self.source_url(package, tag).await? else {
            warn!(package, tag, "upstream build has no source url");
            return Ok(BuildJob::local(package, BuildResult::Failed));
        };

        let task_id = self
            .downstream
            .submit_build(&source, &self.options.target)
            .await?;
        info!(package, %task_id, %source, "submitted source build");

        let result = match self.watcher.watch(task_id).await {
            Ok(state) => state.build_result().unwrap_or(BuildResult::Failed),
            Err(e) => {
                warn!(package, %task_id, error = %e, "lost track of build task");
                BuildResult::Failed
            }
        };
        Ok(BuildJob::new(package, task_id, result))
    }

    /// Source control URL of the latest upstream build under `tag`.
    async fn source_url(&self, package: &str, tag: &str) -> Result<Option<String>, RemoteError> {
        let rows = self.upstream.latest_rpms(tag, package).await?;
        let Some(build_id) = first_i64(&rows, "build_id") else {
            return Ok(None);
        };
        let Some(build) = self.upstream.get_build(BuildRef::Id(build_id)).await? else {
            return Ok(None);
        };
        Ok(first_str(&build, "source").map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RemoteTaskId, RemoteTaskState};
    use crate::impls::{InMemoryArtifactStore, InMemoryBuildSystem, RpmBuild};

    struct Fixture {
        up: Arc<InMemoryBuildSystem>,
        down: Arc<InMemoryBuildSystem>,
        store: Arc<InMemoryArtifactStore>,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                up: Arc::new(InMemoryBuildSystem::new()),
                down: Arc::new(InMemoryBuildSystem::new()),
                store: Arc::new(InMemoryArtifactStore::new()),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn options(&self) -> RebuildOptions {
            let mut options = RebuildOptions::new("f40", "mirror", "mirror-build");
            options.poll_interval = Duration::from_millis(1);
            options.import.download_dir = self.dir.path().to_path_buf();
            options
        }

        fn engine(&self, options: RebuildOptions) -> RebuildEngine {
            RebuildEngine::new(self.up.clone(), self.down.clone(), self.store.clone(), options)
        }

        async fn ready_engine(&self, options: RebuildOptions) -> RebuildEngine {
            let engine = self.engine(options);
            engine.authenticate().await.unwrap();
            engine
        }
    }

    #[tokio::test]
    async fn refuses_to_run_unauthenticated() {
        let fx = Fixture::new();
        let engine = fx.engine(fx.options());
        assert!(matches!(engine.rebuild("a").await, Err(EngineError::NotAuthenticated)));
        assert!(fx.up.calls().is_empty());
    }

    #[tokio::test]
    async fn logs_in_when_session_is_stale() {
        let fx = Fixture::new();
        fx.down.set_authenticated(false);
        let engine = fx.engine(fx.options());
        engine.authenticate().await.unwrap();
        assert_eq!(fx.down.calls_matching("login").len(), 1);
    }

    #[tokio::test]
    async fn failed_login_is_fatal() {
        let fx = Fixture::new();
        fx.down.set_authenticated(false);
        fx.down.set_login_allowed(false);
        let engine = fx.engine(fx.options());
        assert!(matches!(engine.authenticate().await, Err(EngineError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn registers_package_downstream_once() {
        let fx = Fixture::new();
        fx.up.add_build("f40", RpmBuild::new("a", "1", "1"));
        let engine = fx.ready_engine(fx.options()).await;

        engine.rebuild("a").await.unwrap();
        engine.rebuild("a").await.unwrap();

        assert!(fx.down.tag_has_package("mirror", "a"));
        assert_eq!(fx.down.calls_matching("add_tag_package").len(), 1);
    }

    #[tokio::test]
    async fn missing_source_url_fails_without_submission() {
        let fx = Fixture::new();
        fx.up.add_build("f40", RpmBuild::new("a", "1", "1").without_source());
        let engine = fx.ready_engine(fx.options()).await;

        let job = engine.rebuild("a").await.unwrap();
        assert_eq!(job, BuildJob::local("a", BuildResult::Failed));
        assert!(fx.down.submissions().is_empty());
    }

    #[tokio::test]
    async fn remote_errors_become_failed_jobs() {
        let fx = Fixture::new();
        fx.up.add_build("f40", RpmBuild::new("a", "1", "1"));
        fx.down.fail_method("has_tag_package");
        let engine = fx.ready_engine(fx.options()).await;

        let job = engine.rebuild("a").await.unwrap();
        assert_eq!(job.result, BuildResult::Failed);
        assert_eq!(job.task_id, RemoteTaskId::NONE);
    }

    #[tokio::test]
    async fn cancelled_task_keeps_its_id() {
        let fx = Fixture::new();
        fx.up.add_build("f40", RpmBuild::new("a", "1", "1").source("git://a"));
        fx.down.script_task("git://a", Some(7), vec![Some(RemoteTaskState::Cancelled)]);
        let engine = fx.ready_engine(fx.options()).await;

        let job = engine.rebuild("a").await.unwrap();
        assert_eq!(job, BuildJob::new("a", RemoteTaskId::new(7), BuildResult::Cancelled));
    }

    #[tokio::test]
    async fn lost_task_is_failed_with_its_id() {
        let fx = Fixture::new();
        fx.up.add_build("f40", RpmBuild::new("a", "1", "1").source("git://a"));
        fx.down.script_task("git://a", Some(8), vec![Some(RemoteTaskState::Open)]);
        fx.down.fail_method("task_info");
        let engine = fx.ready_engine(fx.options()).await;

        let job = engine.rebuild("a").await.unwrap();
        assert_eq!(job, BuildJob::new("a", RemoteTaskId::new(8), BuildResult::Failed));
    }

    #[tokio::test]
    async fn fast_track_only_when_enabled() {
        let fx = Fixture::new();
        fx.up.add_build("f40", RpmBuild::new("r", "1", "1").arches(["src", "noarch"]));
        let mut options = fx.options();

        let engine = fx.ready_engine(options.clone()).await;
        assert_eq!(engine.choose_strategy("f40", "r").await.unwrap(), Strategy::SourceBuild);

        options.fast_track = true;
        let engine = fx.ready_engine(options).await;
        assert_eq!(engine.choose_strategy("f40", "r").await.unwrap(), Strategy::FastTrackImport);
    }

    #[tokio::test]
    async fn import_timeout_fails_by_default() {
        let fx = Fixture::new();
        fx.up.add_build("f40", RpmBuild::new("r", "1", "1").arches(["src", "noarch"]));
        fx.store.set_delay(Duration::from_secs(5));
        let mut options = fx.options();
        options.fast_track = true;
        options.import_timeout = Some(Duration::from_millis(10));
        let engine = fx.ready_engine(options).await;

        let job = engine.rebuild("r").await.unwrap();
        assert_eq!(job, BuildJob::local("r", BuildResult::Failed));
        assert!(fx.down.submissions().is_empty());
    }

    #[tokio::test]
    async fn import_timeout_can_fall_back_to_source_build() {
        let fx = Fixture::new();
        fx.up.add_build(
            "f40",
            RpmBuild::new("r", "1", "1").arches(["src", "noarch"]).source("git://r"),
        );
        fx.down.script_task("git://r", Some(9), vec![Some(RemoteTaskState::Closed)]);
        fx.store.set_delay(Duration::from_secs(5));
        let mut options = fx.options();
        options.fast_track = true;
        options.import_timeout = Some(Duration::from_millis(10));
        options.on_import_timeout = ImportTimeoutPolicy::SourceBuild;
        let engine = fx.ready_engine(options).await;

        let job = engine.rebuild("r").await.unwrap();
        assert_eq!(job, BuildJob::new("r", RemoteTaskId::new(9), BuildResult::Complete));
        assert_eq!(fx.down.submissions().len(), 1);
    }
}
