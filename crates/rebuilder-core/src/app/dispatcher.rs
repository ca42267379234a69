//! Dispatcher - backlog を `C` 件ずつ再ビルドエンジンに流す
//!
//! # ループ
//! 0. `C` を一度だけ求める。0 または問い合わせ失敗はここで致命的（作業開始前）
//! 1. backlog の先頭から in-flight 集合を `C` まで補充
//! 2. in-flight が空（ready host が 0 に落ちた）→ 待って再問い合わせ、繰り返す
//! 3. 最初に終わったジョブを待ち、他の終了済みジョブもすべて回収
//! 4. 各ジョブ：ログ、結果記録、必要なら通知
//! 5. `C` を更新
//!
//! ループ開始後、投入されたパッケージは必ず結果記録に残る。
//!
//! backlog と in-flight 集合は [`Dispatcher::run`] だけが所有する。
//! 投入は backlog 順、報告は完了順。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::policy::{NotificationPolicy, task_url};
use super::rebuild::{EngineError, RebuildEngine};
use super::status::RunReport;
use crate::domain::{Backlog, BuildJob, BuildResult, RemoteError, RunId};
use crate::ports::{BuildNotice, BuildSystem, Notifier, OutcomeLog};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("package backlog is empty")]
    EmptyBacklog,

    #[error("no build capacity: nothing could be admitted")]
    NoCapacity,

    #[error("could not query build capacity: {0}")]
    CapacityQuery(#[source] RemoteError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Where the concurrency ceiling `C` comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityPolicy {
    Fixed(usize),
    /// Ready downstream hosts for `arch` plus our own running jobs, re-queried
    /// every loop, never above `max`.
    ReadyHosts { arch: String, max: usize },
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub capacity: CapacityPolicy,
    /// Base of downstream task links in notices.
    pub web_url: String,
    /// Pause before asking again when no host is ready mid-run.
    pub capacity_retry: Duration,
}

pub struct Dispatcher {
    engine: Arc<RebuildEngine>,
    downstream: Arc<dyn BuildSystem>,
    outcome_log: Arc<dyn OutcomeLog>,
    notifier: Option<Arc<dyn Notifier>>,
    policy: NotificationPolicy,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<RebuildEngine>,
        downstream: Arc<dyn BuildSystem>,
        outcome_log: Arc<dyn OutcomeLog>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            engine,
            downstream,
            outcome_log,
            notifier: None,
            policy: NotificationPolicy::default(),
            options,
        }
    }

    pub fn with_notifier(
        mut self,
        notifier: Arc<dyn Notifier>,
        policy: NotificationPolicy,
    ) -> Self {
        self.notifier = Some(notifier);
        self.policy = policy;
        self
    }

    /// Run the whole backlog to completion.
    ///
    /// Dropping the returned future aborts every in-flight rebuild.
    pub async fn run(&self, backlog: Backlog) -> Result<RunReport, DispatchError> {
        if backlog.is_empty() {
            return Err(DispatchError::EmptyBacklog);
        }
        let run_id = RunId::generate();
        let span = info_span!("dispatch", %run_id);
        self.run_inner(run_id, backlog).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: RunId,
        mut backlog: Backlog,
    ) -> Result<RunReport, DispatchError> {
        self.engine.authenticate().await?;
        let mut ceiling = self.initial_ceiling().await?;
        let started_at = Utc::now();
        info!(packages = backlog.len(), ceiling, "starting dispatch");

        let mut in_flight: JoinSet<Result<BuildJob, EngineError>> = JoinSet::new();
        let mut admitted: HashMap<Id, String> = HashMap::new();
        let mut jobs = Vec::with_capacity(backlog.len());
        let mut peak_in_flight = 0;

        while !backlog.is_empty() || !in_flight.is_empty() {
            while in_flight.len() < ceiling {
                let Some(package) = backlog.pop_front() else {
                    break;
                };
                debug!(%package, "admitting");
                let engine = self.engine.clone();
                let span = info_span!("rebuild", %package);
                let name = package.clone();
                let handle = in_flight
                    .spawn(async move { engine.rebuild(&name).await }.instrument(span));
                admitted.insert(handle.id(), package);
            }
            peak_in_flight = peak_in_flight.max(in_flight.len());
            if in_flight.is_empty() {
                debug!(waiting = backlog.len(), "no ready hosts, waiting");
                tokio::time::sleep(self.options.capacity_retry).await;
                ceiling = self.refresh_ceiling(ceiling, 0).await;
                continue;
            }

            let Some(first) = in_flight.join_next_with_id().await else {
                continue;
            };
            let mut finished = vec![settle(first, &mut admitted)?];
            while let Some(next) = in_flight.try_join_next_with_id() {
                finished.push(settle(next, &mut admitted)?);
            }
            for job in finished {
                self.report(&job).await;
                jobs.push(job);
            }
            ceiling = self.refresh_ceiling(ceiling, in_flight.len()).await;
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            jobs,
            peak_in_flight,
        };
        let counts = report.counts();
        info!(
            complete = counts.complete,
            failed = counts.failed,
            cancelled = counts.cancelled,
            deleted = counts.deleted,
            "dispatch finished"
        );
        Ok(report)
    }

    /// First reading of `C`. Every failure here is fatal.
    async fn initial_ceiling(&self) -> Result<usize, DispatchError> {
        let ceiling = match &self.options.capacity {
            CapacityPolicy::Fixed(n) => *n,
            CapacityPolicy::ReadyHosts { arch, max } => self
                .downstream
                .ready_hosts(arch)
                .await
                .map_err(DispatchError::CapacityQuery)?
                .min(*max),
        };
        if ceiling == 0 {
            return Err(DispatchError::NoCapacity);
        }
        Ok(ceiling)
    }

    /// `C` during the run. A failed query keeps `last`.
    async fn refresh_ceiling(&self, last: usize, in_flight: usize) -> usize {
        let CapacityPolicy::ReadyHosts { arch, max } = &self.options.capacity else {
            return last;
        };
        match self.downstream.ready_hosts(arch).await {
            Ok(ready) => (ready + in_flight).min(*max),
            Err(e) => {
                warn!(error = %e, ceiling = last, "host query failed, keeping last ceiling");
                last
            }
        }
    }

    async fn report(&self, job: &BuildJob) {
        let (package, task_id, result) = (&job.package, job.task_id, job.result);
        match result {
            BuildResult::Complete => info!(%package, %task_id, %result, "build finished"),
            BuildResult::Cancelled => warn!(%package, %task_id, %result, "build cancelled"),
            BuildResult::Failed | BuildResult::Deleted => {
                error!(%package, %task_id, %result, "build failed")
            }
        }

        if let Err(e) = self.outcome_log.record(job).await {
            warn!(%package, error = %e, "could not record outcome");
        }

        let Some(notifier) = &self.notifier else {
            return;
        };
        if !self.policy.notify_build(result) {
            return;
        }
        let notice = BuildNotice {
            package: package.clone(),
            result,
            task_url: task_url(&self.options.web_url, task_id),
        };
        if let Err(e) = notifier.build_notice(&notice).await {
            warn!(%package, error = %e, "could not send build notice");
        }
    }
}

/// Turn one joined task into its job, releasing the admission entry.
fn settle(
    joined: Result<(Id, Result<BuildJob, EngineError>), JoinError>,
    admitted: &mut HashMap<Id, String>,
) -> Result<BuildJob, DispatchError> {
    match joined {
        Ok((id, outcome)) => {
            admitted.remove(&id);
            Ok(outcome?)
        }
        Err(e) => {
            let package = admitted.remove(&e.id()).unwrap_or_default();
            error!(%package, error = %e, "rebuild task died");
            Ok(BuildJob::local(package, BuildResult::Failed))
        }
    }
}
