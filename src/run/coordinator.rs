// src/run/coordinator.rs

//! The single-flight run coordinator.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;

use super::{RunRequest, RunnerBackend};

/// Serializes command executions.
///
/// The coordinator owns the only copy of the last-run-start timestamp and
/// invokes the runner synchronously, so no two executions can ever overlap.
/// Every accepted request is acknowledged exactly once, stale or not.
pub struct Coordinator<R: RunnerBackend> {
    runner: R,
    request_rx: mpsc::Receiver<RunRequest>,
}

impl<R: RunnerBackend> Coordinator<R> {
    pub fn new(runner: R, request_rx: mpsc::Receiver<RunRequest>) -> Self {
        Self { runner, request_rx }
    }

    /// Main serializer loop.
    ///
    /// Runs the command once unconditionally so the surface shows output
    /// immediately, then once per request whose timestamp postdates the
    /// start of the most recent run. Requests timestamped at or before that
    /// start were already covered by it and are acknowledged without
    /// running — a walk or a queued burst of notification events can carry
    /// such timestamps.
    pub async fn run(mut self) -> Result<()> {
        info!("coordinator started; running command once at startup");
        let mut last_run_start = Instant::now();
        self.runner.run().await?;

        while let Some(request) = self.request_rx.recv().await {
            if last_run_start < request.timestamp {
                last_run_start = Instant::now();
                self.runner.run().await?;
            } else {
                debug!("stale run request; acknowledging without running");
            }
            // The requester may have gone away; that is not our problem.
            let _ = request.done.send(());
        }

        info!("run request channel closed; coordinator exiting");
        Ok(())
    }
}
