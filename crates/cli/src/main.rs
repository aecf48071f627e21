//! Regen CLI - regen command

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use regen_trigger::{Trigger, Workers};
use regen_watcher::{build_detector, Backend, IgnoreRules};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

mod config;
mod logging;
mod runner;

use config::{Overrides, RegenConfig};
use runner::CommandRunner;

/// How long shutdown waits for workers stuck in a poll or a regeneration
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How often the foreground loop checks that both workers are alive
const WORKER_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Regen - rerun a command once per burst of file changes
#[derive(Parser)]
#[command(name = "regen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Files or directories to watch
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Command to run after changes settle (after `--`)
    #[arg(last = true, required = true)]
    command: Vec<String>,

    /// Config file (default: ./regen.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Change detection backend: notify or poll
    #[arg(long)]
    backend: Option<Backend>,

    /// Debounce tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Quiet window after the last change, in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Detector poll interval in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let _log_guard = logging::init(cli.verbose, cli.log_file.as_deref())?;

    // Canonical, so it lines up with the paths OS notifications carry
    let root = std::env::current_dir()
        .and_then(std::fs::canonicalize)
        .context("Failed to get current directory")?;
    let config = config::load(cli.config.as_deref(), &root)?.with_overrides(&Overrides {
        backend: cli.backend,
        tick_ms: cli.tick_ms,
        window_ms: cli.window_ms,
        poll_ms: cli.poll_ms,
    });
    config.validate()?;

    run(&cli, config, root).await
}

async fn run(cli: &Cli, config: RegenConfig, root: PathBuf) -> Result<()> {
    let runner = CommandRunner::new(&cli.command)?;
    let rules = IgnoreRules::load(&root, config.ignore.clone())?;
    let detector = build_detector(config.watch.backend, config.watch.poll_interval(), rules)?;

    let trigger = Trigger::new(detector, config.trigger);
    trigger.set_active(true);
    for path in &cli.paths {
        trigger.watch(&path.display().to_string())?;
    }

    let workers = trigger
        .start(runner.clone())?
        .context("Trigger workers did not start")?;

    println!(
        "{} {} path(s) with {}, running {} after {}ms of quiet",
        "Watching".green().bold(),
        cli.paths.len(),
        config.watch.backend,
        runner.describe().bold(),
        config.trigger.quiet_window_ms
    );

    let stop = supervise(&workers, tokio::signal::ctrl_c()).await?;
    match stop {
        Stop::Interrupted => info!("Shutting down"),
        Stop::WorkerExited => error!("Trigger worker exited unexpectedly, shutting down"),
    }

    trigger.end(&runner)?;

    // Workers notice the flag after their current poll or tick
    let join = tokio::task::spawn_blocking(move || workers.join());
    match tokio::time::timeout(SHUTDOWN_GRACE, join).await {
        Ok(joined) => joined.context("Worker join task failed")??,
        Err(_) => warn!("Workers still busy after {:?}, exiting anyway", SHUTDOWN_GRACE),
    }

    if stop == Stop::WorkerExited {
        anyhow::bail!("Trigger workers exited before shutdown was requested");
    }
    Ok(())
}

/// Why the foreground loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// `shutdown` resolved (Ctrl-C)
    Interrupted,
    /// A worker died while the trigger was still active
    WorkerExited,
}

/// Wait for `shutdown` or for either worker to exit, whichever comes first
async fn supervise<F>(workers: &Workers, shutdown: F) -> Result<Stop>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(shutdown);
    let mut check = tokio::time::interval(WORKER_CHECK_INTERVAL);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("Failed to listen for Ctrl-C")?;
                return Ok(Stop::Interrupted);
            }
            _ = check.tick() => {
                if workers.any_finished() {
                    return Ok(Stop::WorkerExited);
                }
            }
        }
    }
}
