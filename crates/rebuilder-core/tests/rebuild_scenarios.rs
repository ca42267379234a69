//! End-to-end rebuild scenarios against in-memory hubs.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use rebuilder_core::app::{
    AlertMode, CapacityPolicy, DispatchError, DispatchOptions, Dispatcher, NotificationPolicy,
    RebuildEngine, RebuildOptions, Trigger,
};
use rebuilder_core::domain::{
    Backlog, BuildJob, BuildResult, BuildState, RemoteTaskId, RemoteTaskState,
};
use rebuilder_core::impls::{
    InMemoryArtifactStore, InMemoryBuildSystem, ListFiles, RecordingNotifier, RpmBuild,
};

const UP_TAG: &str = "f40-updates";
const PARENT_TAG: &str = "f40";
const DOWN_TAG: &str = "mirror-f40";

struct World {
    up: Arc<InMemoryBuildSystem>,
    down: Arc<InMemoryBuildSystem>,
    store: Arc<InMemoryArtifactStore>,
    dir: tempfile::TempDir,
}

impl World {
    fn new() -> Self {
        let up = Arc::new(InMemoryBuildSystem::new());
        up.set_parent(UP_TAG, PARENT_TAG);
        Self {
            up,
            down: Arc::new(InMemoryBuildSystem::new()),
            store: Arc::new(InMemoryArtifactStore::new()),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn options(&self, fast_track: bool) -> RebuildOptions {
        let mut options = RebuildOptions::new(UP_TAG, DOWN_TAG, "mirror-f40-build");
        options.fast_track = fast_track;
        options.poll_interval = Duration::from_millis(1);
        options.import.download_dir = self.dir.path().join("rpms");
        options
    }

    fn engine(&self, fast_track: bool) -> RebuildEngine {
        RebuildEngine::new(
            self.up.clone(),
            self.down.clone(),
            self.store.clone(),
            self.options(fast_track),
        )
    }

    async fn rebuild(&self, fast_track: bool, package: &str) -> BuildJob {
        let engine = self.engine(fast_track);
        engine.authenticate().await.unwrap();
        engine.rebuild(package).await.unwrap()
    }
}

#[tokio::test]
async fn unavailable_package_fails_without_submission() {
    let world = World::new();

    let job = world.rebuild(false, "p").await;

    assert_eq!(job, BuildJob::new("p", RemoteTaskId::NONE, BuildResult::Failed));
    assert!(world.down.submissions().is_empty());
    assert!(world.down.calls_matching("has_tag_package").is_empty());
    assert_eq!(world.up.calls_matching("latest_rpms").len(), 2);
}

#[tokio::test]
async fn duplicate_short_circuits_to_complete() {
    let world = World::new();
    world
        .up
        .add_build(UP_TAG, RpmBuild::new("q", "1.0", "1").arches(["src", "noarch"]));
    world.down.add_build_record("q-1.0-1", BuildState::Complete);

    let job = world.rebuild(true, "q").await;

    assert_eq!(job, BuildJob::new("q", RemoteTaskId::NONE, BuildResult::Complete));
    assert!(world.down.submissions().is_empty());
    assert!(world.down.imports().is_empty());
    assert!(world.store.downloads().is_empty());
}

#[tokio::test]
async fn fast_track_imports_noarch_package() {
    let world = World::new();
    world
        .up
        .add_build(UP_TAG, RpmBuild::new("r", "2.1", "3").arches(["src", "noarch"]));

    let job = world.rebuild(true, "r").await;

    assert_eq!(job, BuildJob::new("r", RemoteTaskId::NONE, BuildResult::Complete));
    assert_eq!(world.store.downloads().len(), 2);
    assert_eq!(world.down.imports().len(), 2);
    assert_eq!(world.down.tagged(), vec![(DOWN_TAG.to_string(), "r-2.1-3".to_string())]);
    assert!(world.down.submissions().is_empty());
}

#[tokio::test]
async fn fast_track_download_failure_is_failed() {
    let world = World::new();
    world
        .up
        .add_build(UP_TAG, RpmBuild::new("r", "2.1", "3").arches(["src", "noarch"]));
    world.store.fail_url("r-2.1-3.src.rpm");

    let job = world.rebuild(true, "r").await;

    assert_eq!(job, BuildJob::new("r", RemoteTaskId::NONE, BuildResult::Failed));
    assert!(world.down.imports().is_empty());
    assert!(world.down.submissions().is_empty());
}

#[tokio::test]
async fn source_build_follows_task_to_completion() {
    let world = World::new();
    world
        .up
        .add_build(UP_TAG, RpmBuild::new("s", "1", "1").source("git+https://src/s.git#abc"));
    world.down.script_task(
        "git+https://src/s.git#abc",
        Some(42),
        vec![
            Some(RemoteTaskState::Open),
            Some(RemoteTaskState::Open),
            Some(RemoteTaskState::Closed),
        ],
    );

    let job = world.rebuild(false, "s").await;

    assert_eq!(job, BuildJob::new("s", RemoteTaskId::new(42), BuildResult::Complete));
    assert_eq!(
        world.down.submissions(),
        vec![("git+https://src/s.git#abc".to_string(), "mirror-f40-build".to_string())]
    );
    assert_eq!(world.down.calls_matching("task_info 42").len(), 3);
    assert!(world.down.tag_has_package(DOWN_TAG, "s"));
}

#[tokio::test]
async fn one_binary_arch_forces_source_build() {
    let world = World::new();
    world.up.add_build(
        UP_TAG,
        RpmBuild::new("t", "1", "1").arches(["src", "noarch", "x86_64"]).source("git://t"),
    );

    let job = world.rebuild(true, "t").await;

    assert_eq!(job.result, BuildResult::Complete);
    assert!(job.task_id.exists());
    assert!(world.store.downloads().is_empty());
    assert_eq!(world.down.submissions().len(), 1);
}

#[tokio::test]
async fn parent_tag_is_used_after_fallback() {
    let world = World::new();
    world
        .up
        .add_build(PARENT_TAG, RpmBuild::new("u", "1", "1").arches(["src", "noarch"]));

    let job = world.rebuild(true, "u").await;

    assert_eq!(job.result, BuildResult::Complete);
    let after_resolution: Vec<_> = world
        .up
        .calls_matching("latest_rpms")
        .into_iter()
        .skip(2)
        .collect();
    assert!(!after_resolution.is_empty());
    assert!(
        after_resolution
            .iter()
            .all(|call| call == &format!("latest_rpms {PARENT_TAG} u")),
        "{after_resolution:?}"
    );
    assert!(world.store.downloads().iter().all(|url| url.contains("/u/1/1/")));
}

#[tokio::test]
async fn dispatch_reports_every_package_once() {
    let world = World::new();
    for p in ["a", "b", "c"] {
        world
            .up
            .add_build(UP_TAG, RpmBuild::new(p, "1", "1").source(&format!("git://{p}")));
    }
    world.down.script_task("git://a", Some(1), vec![Some(RemoteTaskState::Closed)]);
    world.down.script_task(
        "git://b",
        Some(2),
        vec![Some(RemoteTaskState::Open); 20]
            .into_iter()
            .chain([Some(RemoteTaskState::Failed)])
            .collect(),
    );
    world.down.script_task("git://c", Some(3), vec![Some(RemoteTaskState::Closed)]);

    let lists = ListFiles::create(
        world.dir.path().join("completed.list"),
        world.dir.path().join("failed.list"),
    )
    .await
    .unwrap();
    let notifier = Arc::new(RecordingNotifier::new());
    let dispatcher = Dispatcher::new(
        Arc::new(world.engine(false)),
        world.down.clone(),
        Arc::new(lists.clone()),
        DispatchOptions {
            capacity: CapacityPolicy::Fixed(2),
            web_url: "https://hub.example.org/koji".into(),
            capacity_retry: Duration::from_millis(1),
        },
    )
    .with_notifier(notifier.clone(), NotificationPolicy::new(AlertMode::Prompt, Trigger::All));

    let report = dispatcher
        .run(Backlog::new(["a", "b", "c"]))
        .await
        .unwrap();

    let order: Vec<_> = report.jobs.iter().map(|j| j.package.as_str()).collect();
    assert_eq!(order.len(), 3);
    assert_eq!(order.last(), Some(&"b"));
    assert!(report.peak_in_flight <= 2);
    assert!(world.down.peak_open_tasks() <= 2);

    let completed = std::fs::read_to_string(lists.completed_path()).unwrap();
    let failed = std::fs::read_to_string(lists.failed_path()).unwrap();
    let all: BTreeSet<_> = completed.lines().chain(failed.lines()).collect();
    assert_eq!(all, BTreeSet::from(["a", "b", "c"]));
    assert_eq!(completed.lines().count() + failed.lines().count(), 3);
    assert_eq!(failed, "b\n");

    let notices = notifier.notices();
    assert_eq!(notices.len(), 3);
    let b = notices.iter().find(|n| n.package == "b").unwrap();
    assert_eq!(b.task_url.as_deref(), Some("https://hub.example.org/koji/taskinfo?taskID=2"));

    let counts = report.counts();
    assert_eq!((counts.complete, counts.failed), (2, 1));
}

#[tokio::test]
async fn zero_capacity_aborts_before_any_work() {
    let world = World::new();
    world.up.add_build(UP_TAG, RpmBuild::new("a", "1", "1"));
    let dispatcher = Dispatcher::new(
        Arc::new(world.engine(false)),
        world.down.clone(),
        Arc::new(rebuilder_core::impls::InMemoryOutcomeLog::new()),
        DispatchOptions {
            capacity: CapacityPolicy::Fixed(0),
            web_url: String::new(),
            capacity_retry: Duration::from_millis(1),
        },
    );

    let err = dispatcher.run(Backlog::new(["a"])).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoCapacity));
    assert!(world.up.calls_matching("latest_rpms").is_empty());
}
