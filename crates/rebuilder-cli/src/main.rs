use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rebuilder_core::app::{Dispatcher, RebuildEngine, RunReport, RunSummary};
use rebuilder_core::impls::{HttpArtifactStore, JsonRpcBuildSystem, ListFiles, LogNotifier};
use rebuilder_core::ports::Notifier;

mod config;

use config::{Config, Logging, load_backlog};

const RPC_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Parser)]
#[command(
    name = "rebuilder",
    version,
    about = "Mirror packages from an upstream build hub into a downstream one"
)]
struct Cli {
    /// YAML configuration file
    config: PathBuf,

    /// Print the package backlog and exit without contacting any hub.
    #[arg(long)]
    dry_run: bool,
}

enum Outcome {
    Finished(RunReport),
    Interrupted,
    Fatal(anyhow::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    if cli.dry_run {
        return match load_backlog(&config.package_builds) {
            Ok(backlog) => {
                backlog.iter().for_each(|pkg| println!("{pkg}"));
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let started_at = Utc::now();
    let outcome = tokio::select! {
        result = dispatch(&config) => match result {
            Ok(report) => Outcome::Finished(report),
            Err(e) => Outcome::Fatal(e),
        },
        _ = tokio::signal::ctrl_c() => Outcome::Interrupted,
    };

    let (summary, code) = match outcome {
        Outcome::Finished(report) => (report.summary("Check attached logs"), ExitCode::SUCCESS),
        Outcome::Interrupted => {
            warn!("received SIGINT, abandoning in-flight builds");
            (RunSummary::aborted(started_at, "Received SIGINT"), ExitCode::SUCCESS)
        }
        Outcome::Fatal(e) => {
            error!(error = %format!("{e:#}"), "run aborted");
            (RunSummary::aborted(started_at, format!("{e:#}")), ExitCode::FAILURE)
        }
    };

    if config.policy().notify_summary()
        && let Err(e) = LogNotifier
            .run_finished(&summary, &config.logging.attachments())
            .await
    {
        warn!(error = %e, "could not send run summary");
    }
    println!("{}", summary.headline());
    code
}

fn init_logging(logging: &Logging) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);
    match logging.application_log() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open application log: {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

async fn dispatch(config: &Config) -> Result<RunReport> {
    let backlog = load_backlog(&config.package_builds)?;
    info!(packages = backlog.len(), "loaded package backlog");

    let upstream = Arc::new(
        JsonRpcBuildSystem::new(&config.upstream.server, config.upstream.token(), RPC_TIMEOUT)
            .context("upstream session")?,
    );
    let downstream = Arc::new(
        JsonRpcBuildSystem::new(
            &config.downstream.server,
            config.downstream.token(),
            RPC_TIMEOUT,
        )
        .context("downstream session")?,
    );
    let store = Arc::new(
        HttpArtifactStore::new(CONNECT_TIMEOUT, READ_TIMEOUT).context("package store client")?,
    );

    let engine = RebuildEngine::new(upstream, downstream.clone(), store, config.rebuild_options());
    let lists = ListFiles::create(&config.logging.completed, &config.logging.failed)
        .await
        .context("create outcome lists")?;

    let dispatcher = Dispatcher::new(
        Arc::new(engine),
        downstream,
        Arc::new(lists),
        config.dispatch_options(),
    )
    .with_notifier(Arc::new(LogNotifier), config.policy());
    let report = dispatcher.run(backlog).await?;
    Ok(report)
}
