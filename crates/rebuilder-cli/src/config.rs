//! YAML configuration of one rebuild run.
//!
//! Field names and defaults follow the long-standing config file layout, so
//! existing files keep working. Unknown keys (mail settings, auth blocks) are
//! ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use rebuilder_core::app::{
    AlertMode, CapacityPolicy, DispatchOptions, ImportOptions, ImportTimeoutPolicy,
    NotificationPolicy, RebuildOptions, Trigger,
};
use rebuilder_core::domain::Backlog;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub upstream: Instance,
    pub downstream: Instance,
    #[serde(default)]
    pub package_builds: PackageBuilds,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub notifications: Notifications,
}

/// One hub.
#[derive(Debug, Clone, Deserialize)]
pub struct Instance {
    /// JSON-RPC endpoint.
    pub server: String,
    #[serde(default)]
    pub weburl: String,
    pub tag: String,
    /// Build target, downstream only.
    pub target: Option<String>,
    #[serde(default)]
    pub arches: Vec<String>,
    /// Name of the environment variable holding the API token.
    pub token_env: Option<String>,
}

impl Instance {
    pub fn token(&self) -> Option<String> {
        self.token_env.as_deref().and_then(|name| std::env::var(name).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityMode {
    #[default]
    Fixed,
    ReadyHosts,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackageBuilds {
    pub max_tasks: usize,
    pub capacity: CapacityMode,
    pub buildlist: PathBuf,
    pub ignorelist: PathBuf,
    pub fasttrack: bool,
    pub topurl: String,
    pub download_dir: PathBuf,
    pub prune_downloads: bool,
    pub poll_interval_secs: u64,
    pub watch_timeout_secs: Option<u64>,
    pub import_timeout_secs: Option<u64>,
    pub on_import_timeout: ImportTimeoutPolicy,
}

impl Default for PackageBuilds {
    fn default() -> Self {
        Self {
            max_tasks: 10,
            capacity: CapacityMode::Fixed,
            buildlist: PathBuf::from("./build.list"),
            ignorelist: PathBuf::from("./ignore.list"),
            fasttrack: false,
            topurl: "https://kojipkgs.fedoraproject.org/packages".to_string(),
            download_dir: PathBuf::from("~/.rpms"),
            prune_downloads: true,
            poll_interval_secs: 60,
            watch_timeout_secs: None,
            import_timeout_secs: None,
            on_import_timeout: ImportTimeoutPolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Application log; empty means stderr.
    pub application: PathBuf,
    pub completed: PathBuf,
    pub failed: PathBuf,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            application: PathBuf::from("./kojibuild.log"),
            completed: PathBuf::from("./completed.list"),
            failed: PathBuf::from("./failed.list"),
        }
    }
}

impl Logging {
    pub fn application_log(&self) -> Option<&Path> {
        (!self.application.as_os_str().is_empty()).then_some(self.application.as_path())
    }

    /// Files worth attaching to the final summary.
    pub fn attachments(&self) -> Vec<PathBuf> {
        self.application_log()
            .map(Path::to_path_buf)
            .into_iter()
            .chain([self.completed.clone(), self.failed.clone()])
            .collect()
    }
}

/// Kept as plain strings: an unrecognised value disables rather than fails.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Notifications {
    pub alert: String,
    pub trigger: String,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            alert: "off".to_string(),
            trigger: "fail".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("parse config yaml: {}", path.display()))?;
        config.expand_paths()?;
        config.validate()?;
        Ok(config)
    }

    fn expand_paths(&mut self) -> Result<()> {
        let pb = &mut self.package_builds;
        for path in [&mut pb.buildlist, &mut pb.ignorelist, &mut pb.download_dir] {
            *path = expand(path)?;
        }
        let logs = &mut self.logging;
        for path in [&mut logs.application, &mut logs.completed, &mut logs.failed] {
            *path = expand(path)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.downstream.target.as_deref().is_none_or(str::is_empty) {
            bail!("downstream.target is required");
        }
        if self.package_builds.capacity == CapacityMode::ReadyHosts
            && self.downstream.arches.is_empty()
        {
            bail!("package_builds.capacity ready_hosts needs downstream.arches");
        }
        if self.package_builds.poll_interval_secs == 0 {
            bail!("package_builds.poll_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn rebuild_options(&self) -> RebuildOptions {
        let pb = &self.package_builds;
        let mut options = RebuildOptions::new(
            self.upstream.tag.clone(),
            self.downstream.tag.clone(),
            self.downstream.target.clone().unwrap_or_default(),
        );
        options.fast_track = pb.fasttrack;
        options.poll_interval = Duration::from_secs(pb.poll_interval_secs);
        options.watch_timeout = pb.watch_timeout_secs.map(Duration::from_secs);
        options.import_timeout = pb.import_timeout_secs.map(Duration::from_secs);
        options.on_import_timeout = pb.on_import_timeout;
        options.import = ImportOptions {
            topurl: pb.topurl.clone(),
            download_dir: pb.download_dir.clone(),
            prune: pb.prune_downloads,
        };
        options
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        let max = self.package_builds.max_tasks;
        let capacity = match (self.package_builds.capacity, self.downstream.arches.first()) {
            (CapacityMode::ReadyHosts, Some(arch)) => CapacityPolicy::ReadyHosts {
                arch: arch.clone(),
                max,
            },
            _ => CapacityPolicy::Fixed(max),
        };
        DispatchOptions {
            capacity,
            web_url: self.downstream.weburl.clone(),
            capacity_retry: Duration::from_secs(self.package_builds.poll_interval_secs),
        }
    }

    pub fn policy(&self) -> NotificationPolicy {
        NotificationPolicy::new(
            AlertMode::parse(&self.notifications.alert),
            Trigger::parse(&self.notifications.trigger),
        )
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw).map_err(|e| anyhow!("expand {raw}: {e}"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Build list minus ignore list. A missing ignore list counts as empty.
pub fn load_backlog(builds: &PackageBuilds) -> Result<Backlog> {
    let build_list = std::fs::read_to_string(&builds.buildlist)
        .with_context(|| format!("read build list: {}", builds.buildlist.display()))?;
    let ignore_list = match std::fs::read_to_string(&builds.ignorelist) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("read ignore list: {}", builds.ignorelist.display()));
        }
    };
    Ok(Backlog::from_lists(&build_list, &ignore_list))
}
