//! NotificationPolicy - 通知に値する終了ジョブの判定
//!
//! 判定だけを持つ純粋な関数群。配送は [`crate::ports::Notifier`] の向こう側。

use serde::{Deserialize, Serialize};

use crate::domain::{BuildResult, RemoteTaskId};

/// Which results trigger a per-build notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    None,
    #[default]
    Fail,
    Build,
    All,
}

impl Trigger {
    /// Unrecognised names fall back to `None`, which never fires.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "fail" => Trigger::Fail,
            "build" => Trigger::Build,
            "all" => Trigger::All,
            _ => Trigger::None,
        }
    }
}

/// When anything is sent at all.
///
/// - Off: nothing
/// - Prompt: per-build notices as jobs finish, plus the final summary
/// - Deferred: only the final summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    #[default]
    Off,
    Prompt,
    Deferred,
}

impl AlertMode {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "prompt" => AlertMode::Prompt,
            "deferred" => AlertMode::Deferred,
            _ => AlertMode::Off,
        }
    }
}

/// `fail` fires on Failed, `build` on Complete, `all` on either.
/// Cancelled and Deleted never fire.
pub fn should_notify(trigger: Trigger, result: BuildResult) -> bool {
    match trigger {
        Trigger::Fail => result == BuildResult::Failed,
        Trigger::Build => result == BuildResult::Complete,
        Trigger::All => matches!(result, BuildResult::Complete | BuildResult::Failed),
        Trigger::None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationPolicy {
    pub alert: AlertMode,
    pub trigger: Trigger,
}

impl NotificationPolicy {
    pub fn new(alert: AlertMode, trigger: Trigger) -> Self {
        Self { alert, trigger }
    }

    pub fn notify_build(&self, result: BuildResult) -> bool {
        self.alert == AlertMode::Prompt && should_notify(self.trigger, result)
    }

    pub fn notify_summary(&self) -> bool {
        self.alert != AlertMode::Off
    }
}

/// `<web-base>/taskinfo?taskID=<id>`, or nothing when no task exists.
pub fn task_url(web_base: &str, task_id: RemoteTaskId) -> Option<String> {
    if !task_id.exists() {
        return None;
    }
    Some(format!(
        "{}/taskinfo?taskID={}",
        web_base.trim_end_matches('/'),
        task_id
    ))
}
