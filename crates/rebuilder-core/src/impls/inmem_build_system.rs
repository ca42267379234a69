//! InMemoryBuildSystem - scripted hub for tests and dry runs
//!
//! Answers queries in the same nested shape as a real hub
//! (`[[rpm rows], [build rows]]`) and records every call, so tests can assert
//! both on results and on what was (or was not) asked of the hub.
//!
//! # Scripting
//! - `add_build` puts a build under a tag
//! - `set_parent` declares a tag's inheritance parent
//! - `script_task` fixes the id and state sequence of the task a source URL
//!   submits; the last state repeats once the script runs out

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain::{BuildState, RemoteError, RemoteTaskId, RemoteTaskState};
use crate::ports::{BuildRef, BuildSystem};

/// One build fixture: the rows a hub would return for it.
#[derive(Debug, Clone)]
pub struct RpmBuild {
    name: String,
    version: String,
    release: String,
    arches: Vec<String>,
    source: Option<String>,
}

impl RpmBuild {
    pub fn new(name: &str, version: &str, release: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
            arches: vec!["src".to_string(), "x86_64".to_string()],
            source: Some(format!(
                "git+https://src.example.org/rpms/{name}.git#{version}-{release}"
            )),
        }
    }

    pub fn arches<const N: usize>(mut self, arches: [&str; N]) -> Self {
        self.arches = arches.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn source(mut self, url: &str) -> Self {
        self.source = Some(url.to_string());
        self
    }

    pub fn without_source(mut self) -> Self {
        self.source = None;
        self
    }

    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }
}

#[derive(Debug)]
struct TaskScript {
    states: VecDeque<Option<RemoteTaskState>>,
    last: Option<RemoteTaskState>,
    finished: bool,
}

#[derive(Default)]
struct State {
    authenticated: bool,
    login_allowed: bool,
    next_build_id: i64,
    next_task_id: i64,
    latest: HashMap<(String, String), Value>,
    builds_by_id: HashMap<i64, Value>,
    builds_by_nvr: HashMap<String, Value>,
    parents: HashMap<String, String>,
    tag_packages: HashSet<(String, String)>,
    scripts_by_source: HashMap<String, (Option<i64>, Vec<Option<RemoteTaskState>>)>,
    tasks: HashMap<i64, TaskScript>,
    open_tasks: usize,
    peak_open_tasks: usize,
    submissions: Vec<(String, String)>,
    uploads: Vec<(String, String)>,
    imports: Vec<String>,
    untagged: Vec<Value>,
    tagged: Vec<(String, String)>,
    ready_hosts: usize,
    failing: HashSet<String>,
    transient_failures: HashMap<String, usize>,
    calls: Vec<String>,
}

pub struct InMemoryBuildSystem {
    state: Mutex<State>,
}

impl InMemoryBuildSystem {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                authenticated: true,
                login_allowed: true,
                next_build_id: 1000,
                next_task_id: 100,
                ready_hosts: 4,
                ..State::default()
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        // Poisoning only happens if a test already panicked.
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Record the call and apply any injected failure for `method`.
    fn enter(&self, method: &str, call: String) -> Result<(), RemoteError> {
        self.with_state(|s| {
            s.calls.push(call);
            if s.failing.contains(method) {
                return Err(RemoteError::Fault {
                    code: 1000,
                    message: format!("{method} failed"),
                });
            }
            if let Some(left) = s.transient_failures.get_mut(method)
                && *left > 0
            {
                *left -= 1;
                return Err(RemoteError::Transport(format!("{method}: connection reset")));
            }
            Ok(())
        })
    }

    pub fn add_build(&self, tag: &str, build: RpmBuild) {
        self.with_state(|s| {
            s.next_build_id += 1;
            let build_id = s.next_build_id;
            let nvr = build.nvr();
            let rpms: Vec<Value> = build
                .arches
                .iter()
                .enumerate()
                .map(|(i, arch)| {
                    json!({
                        "id": build_id * 10 + i as i64,
                        "build_id": build_id,
                        "name": build.name,
                        "version": build.version,
                        "release": build.release,
                        "arch": arch,
                    })
                })
                .collect();
            let record = json!({
                "build_id": build_id,
                "id": build_id,
                "name": build.name,
                "package_name": build.name,
                "version": build.version,
                "release": build.release,
                "nvr": nvr,
                "state": BuildState::Complete.code(),
                "source": build.source,
                "tag_name": tag,
            });
            s.latest.insert(
                (tag.to_string(), build.name.clone()),
                json!([rpms, [record.clone()]]),
            );
            s.builds_by_id.insert(build_id, record.clone());
            s.builds_by_nvr.insert(nvr, record);
        })
    }

    /// A build record that exists on the hub but is not tagged anywhere.
    pub fn add_build_record(&self, nvr: &str, state: BuildState) {
        self.with_state(|s| {
            s.next_build_id += 1;
            let record = json!({"id": s.next_build_id, "nvr": nvr, "state": state.code()});
            s.builds_by_nvr.insert(nvr.to_string(), record);
        })
    }

    pub fn set_parent(&self, tag: &str, parent: &str) {
        self.with_state(|s| {
            s.parents.insert(tag.to_string(), parent.to_string());
        })
    }

    pub fn script_task(
        &self,
        source: &str,
        task_id: Option<i64>,
        states: Vec<Option<RemoteTaskState>>,
    ) {
        self.with_state(|s| {
            s.scripts_by_source.insert(source.to_string(), (task_id, states));
        })
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.with_state(|s| s.authenticated = authenticated)
    }

    pub fn set_login_allowed(&self, allowed: bool) {
        self.with_state(|s| s.login_allowed = allowed)
    }

    pub fn set_ready_hosts(&self, hosts: usize) {
        self.with_state(|s| s.ready_hosts = hosts)
    }

    /// Every later call of `method` fails with a hub fault.
    pub fn fail_method(&self, method: &str) {
        self.with_state(|s| {
            s.failing.insert(method.to_string());
        })
    }

    /// The next `times` calls of `method` fail with a transport error.
    pub fn fail_times(&self, method: &str, times: usize) {
        self.with_state(|s| {
            s.transient_failures.insert(method.to_string(), times);
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.with_state(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).cloned().collect())
    }

    pub fn submissions(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.submissions.clone())
    }

    pub fn uploads(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.uploads.clone())
    }

    pub fn imports(&self) -> Vec<String> {
        self.with_state(|s| s.imports.clone())
    }

    pub fn tagged(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.tagged.clone())
    }

    pub fn tag_has_package(&self, tag: &str, package: &str) -> bool {
        self.with_state(|s| s.tag_packages.contains(&(tag.to_string(), package.to_string())))
    }

    /// Most tasks that were submitted and not yet seen finished at once.
    pub fn peak_open_tasks(&self) -> usize {
        self.with_state(|s| s.peak_open_tasks)
    }
}

impl Default for InMemoryBuildSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildSystem for InMemoryBuildSystem {
    async fn is_authenticated(&self) -> Result<bool, RemoteError> {
        self.enter("is_authenticated", "is_authenticated".to_string())?;
        Ok(self.with_state(|s| s.authenticated))
    }

    async fn login(&self) -> Result<(), RemoteError> {
        self.enter("login", "login".to_string())?;
        self.with_state(|s| {
            if s.login_allowed {
                s.authenticated = true;
                Ok(())
            } else {
                Err(RemoteError::NotAuthenticated)
            }
        })
    }

    async fn latest_rpms(&self, tag: &str, package: &str) -> Result<Value, RemoteError> {
        self.enter("latest_rpms", format!("latest_rpms {tag} {package}"))?;
        Ok(self.with_state(|s| {
            s.latest
                .get(&(tag.to_string(), package.to_string()))
                .cloned()
                .unwrap_or_else(|| json!([[], []]))
        }))
    }

    async fn get_build(&self, build: BuildRef<'_>) -> Result<Option<Value>, RemoteError> {
        let call = match build {
            BuildRef::Id(id) => format!("get_build {id}"),
            BuildRef::Nvr(nvr) => format!("get_build {nvr}"),
        };
        self.enter("get_build", call)?;
        Ok(self.with_state(|s| match build {
            BuildRef::Id(id) => s.builds_by_id.get(&id).cloned(),
            BuildRef::Nvr(nvr) => s.builds_by_nvr.get(nvr).cloned(),
        }))
    }

    async fn inheritance(&self, tag: &str) -> Result<Value, RemoteError> {
        self.enter("inheritance", format!("inheritance {tag}"))?;
        Ok(self.with_state(|s| match s.parents.get(tag) {
            Some(parent) => json!([{"name": parent, "parent_id": 1, "priority": 0}]),
            None => json!([]),
        }))
    }

    async fn has_tag_package(&self, tag: &str, package: &str) -> Result<bool, RemoteError> {
        self.enter("has_tag_package", format!("has_tag_package {tag} {package}"))?;
        Ok(self.tag_has_package(tag, package))
    }

    async fn add_tag_package(&self, tag: &str, package: &str) -> Result<(), RemoteError> {
        self.enter("add_tag_package", format!("add_tag_package {tag} {package}"))?;
        self.with_state(|s| {
            s.tag_packages.insert((tag.to_string(), package.to_string()));
        });
        Ok(())
    }

    async fn submit_build(&self, source: &str, target: &str) -> Result<RemoteTaskId, RemoteError> {
        self.enter("submit_build", format!("submit_build {source} {target}"))?;
        Ok(self.with_state(|s| {
            let (fixed_id, states) = s
                .scripts_by_source
                .remove(source)
                .unwrap_or((None, vec![Some(RemoteTaskState::Closed)]));
            let task_id = fixed_id.unwrap_or_else(|| {
                s.next_task_id += 1;
                s.next_task_id
            });
            s.tasks.insert(
                task_id,
                TaskScript {
                    states: states.into(),
                    last: None,
                    finished: false,
                },
            );
            s.submissions.push((source.to_string(), target.to_string()));
            s.open_tasks += 1;
            s.peak_open_tasks = s.peak_open_tasks.max(s.open_tasks);
            RemoteTaskId::new(task_id)
        }))
    }

    async fn task_info(&self, task_id: RemoteTaskId) -> Result<Option<Value>, RemoteError> {
        self.enter("task_info", format!("task_info {task_id}"))?;
        Ok(self.with_state(|s| {
            let script = s.tasks.get_mut(&task_id.get())?;
            let state = match script.states.pop_front() {
                Some(next) => {
                    script.last = next;
                    next
                }
                None => script.last,
            };
            let state = state?;
            let newly_finished = state.is_terminal() && !script.finished;
            if newly_finished {
                script.finished = true;
                s.open_tasks -= 1;
            }
            Some(json!({"id": task_id.get(), "method": "build", "state": state.code()}))
        }))
    }

    async fn upload(&self, local: &Path, server_dir: &str) -> Result<(), RemoteError> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.enter("upload", format!("upload {server_dir} {file_name}"))?;
        tokio::fs::metadata(local).await?;
        self.with_state(|s| s.uploads.push((server_dir.to_string(), file_name)));
        Ok(())
    }

    async fn import_rpm(&self, server_dir: &str, file_name: &str) -> Result<(), RemoteError> {
        self.enter("import_rpm", format!("import_rpm {server_dir} {file_name}"))?;
        let uploaded = self.with_state(|s| {
            s.uploads
                .iter()
                .any(|(dir, name)| dir == server_dir && name == file_name)
        });
        if !uploaded {
            return Err(RemoteError::Fault {
                code: 1000,
                message: format!("no such file {server_dir}/{file_name}"),
            });
        }
        self.with_state(|s| {
            s.imports.push(file_name.to_string());
            // name-version-release.arch.rpm
            let stem = file_name.trim_end_matches(".rpm");
            let nvr = stem.rsplit_once('.').map_or(stem, |(nvr, _arch)| nvr);
            let name = nvr.rsplitn(3, '-').nth(2).unwrap_or(nvr);
            let known = s.untagged.iter().any(|b| b["nvr"] == nvr);
            if !known {
                s.untagged.push(json!({"name": name, "nvr": nvr}));
            }
        });
        Ok(())
    }

    async fn untagged_builds(&self) -> Result<Value, RemoteError> {
        self.enter("untagged_builds", "untagged_builds".to_string())?;
        Ok(self.with_state(|s| Value::Array(s.untagged.clone())))
    }

    async fn tag_build(&self, tag: &str, nvr: &str) -> Result<(), RemoteError> {
        self.enter("tag_build", format!("tag_build {tag} {nvr}"))?;
        self.with_state(|s| {
            s.untagged.retain(|b| b["nvr"] != nvr);
            s.tagged.push((tag.to_string(), nvr.to_string()));
        });
        Ok(())
    }

    async fn ready_hosts(&self, arch: &str) -> Result<usize, RemoteError> {
        self.enter("ready_hosts", format!("ready_hosts {arch}"))?;
        Ok(self.with_state(|s| s.ready_hosts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_task_replays_states_then_sticks() {
        let hub = InMemoryBuildSystem::new();
        hub.script_task(
            "git://s",
            Some(42),
            vec![None, Some(RemoteTaskState::Open), Some(RemoteTaskState::Closed)],
        );
        let id = hub.submit_build("git://s", "mirror-build").await.unwrap();
        assert_eq!(id.get(), 42);
        assert!(hub.task_info(id).await.unwrap().is_none());
        assert_eq!(hub.task_info(id).await.unwrap().unwrap()["state"], 1);
        assert_eq!(hub.task_info(id).await.unwrap().unwrap()["state"], 2);
        assert_eq!(hub.task_info(id).await.unwrap().unwrap()["state"], 2);
        assert_eq!(hub.peak_open_tasks(), 1);
    }

    #[tokio::test]
    async fn missing_package_answers_empty_rows() {
        let hub = InMemoryBuildSystem::new();
        let rows = hub.latest_rpms("f40", "nope").await.unwrap();
        assert_eq!(rows, json!([[], []]));
    }

    #[tokio::test]
    async fn injected_failures() {
        let hub = InMemoryBuildSystem::new();
        hub.fail_times("ready_hosts", 1);
        assert!(hub.ready_hosts("x86_64").await.unwrap_err().is_transient());
        assert_eq!(hub.ready_hosts("x86_64").await.unwrap(), 4);

        hub.fail_method("inheritance");
        assert!(!hub.inheritance("f40").await.unwrap_err().is_transient());
    }
}
