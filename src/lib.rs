// src/lib.rs

pub mod cli;
pub mod errors;
pub mod logging;
pub mod run;
pub mod sink;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::cli::CliArgs;
use crate::errors::{Result, WatchrunError};
use crate::run::{Coordinator, ProcessRunner, RunRequest, dispatch_events};
use crate::sink::{Directive, Region, Sink, TermSink};
use crate::watch::TreeWatcher;

/// High-level entry point used by `main.rs`.
///
/// Opens the terminal sink and runs the pipeline. Any fatal error deletes
/// the sink best-effort before being handed back to `main`.
pub async fn run(args: CliArgs) -> Result<()> {
    let sink: Arc<dyn Sink> = TermSink::open()?;

    match run_with_sink(args, Arc::clone(&sink)).await {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Err(cleanup) = sink.control(Directive::Delete) {
                warn!(error = %cleanup, "failed to delete sink during shutdown");
            }
            Err(err)
        }
    }
}

/// Run the watch/execute pipeline against an already-open sink.
///
/// This wires together:
/// - sink title and tag setup
/// - the directory tree watcher
/// - the interaction event dispatcher
/// - the run coordinator driving the command runner
///
/// The three units share nothing but the run request channel; the sink
/// handle is passed explicitly into each unit that needs it.
pub async fn run_with_sink(args: CliArgs, sink: Arc<dyn Sink>) -> Result<()> {
    if let Ok(wd) = std::env::current_dir() {
        if let Err(err) = sink.control(Directive::SetWorkingDirHint(wd)) {
            warn!(error = %err, "failed to record working directory");
        }
    }
    let invocation = std::env::args().collect::<Vec<_>>().join(" ");
    if let Err(err) = sink.control(Directive::RecordInvocation(invocation)) {
        warn!(error = %err, "failed to record invocation");
    }

    let (root, title) = resolve_watch_root(Path::new(&args.path))?;
    sink.set_title(&title)?;
    sink.control(Directive::MarkClean)?;
    sink.write_region(Region::Tag, b"Get ")?;

    let events = sink.events()?;
    let (request_tx, request_rx) = mpsc::channel::<RunRequest>(1);

    let watcher = TreeWatcher::new(root, request_tx.clone())?;
    let runner = ProcessRunner::new(Arc::clone(&sink), args.command.clone());
    let coordinator = Coordinator::new(runner, request_rx);

    let mut watch_task = tokio::spawn(watcher.run());
    let mut dispatch_task = tokio::spawn(dispatch_events(Arc::clone(&sink), events, request_tx));

    // The first fatal error wins; the dispatcher finishing means the sink
    // closed its event stream and we exit cleanly.
    tokio::select! {
        res = coordinator.run() => res,
        res = &mut watch_task => res.map_err(|err| WatchrunError::Other(err.into()))?,
        res = &mut dispatch_task => res.map_err(|err| WatchrunError::Other(err.into()))?,
    }
}

/// Resolve the watch root to an absolute path and derive the sink title.
///
/// Directory roots get a trailing separator in the title so the surface
/// treats the name as a directory.
fn resolve_watch_root(path: &Path) -> Result<(PathBuf, String)> {
    let abs = std::path::absolute(path)
        .map_err(|err| WatchrunError::Setup(format!("resolving {}: {err}", path.display())))?;
    let meta = std::fs::metadata(&abs)
        .map_err(|err| WatchrunError::Setup(format!("stat {}: {err}", abs.display())))?;

    let mut shown = abs.display().to_string();
    if meta.is_dir() && !shown.ends_with(std::path::MAIN_SEPARATOR) {
        shown.push(std::path::MAIN_SEPARATOR);
    }
    Ok((abs, format!("{shown}+watch")))
}
