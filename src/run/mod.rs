// src/run/mod.rs

//! The run pipeline: run requests, the serializing coordinator, the
//! command runner, and the interaction event dispatcher.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::errors::Result;

pub mod coordinator;
pub mod dispatcher;
pub mod runner;

pub use coordinator::Coordinator;
pub use dispatcher::dispatch_events;
pub use runner::{BodyWriter, MAX_SINK_WRITE, ProcessRunner, run_command};

/// A request for the coordinator to re-run the command.
#[derive(Debug)]
pub struct RunRequest {
    /// When the change was detected or the manual trigger fired. Always the
    /// detection time, never a file modification time, so clock skew cannot
    /// produce requests from the future or the distant past.
    pub timestamp: Instant,

    /// Signalled once the coordinator has fully handled the request,
    /// whether or not it ran the command.
    pub done: oneshot::Sender<()>,
}

/// Submit one run request and wait for its acknowledgment.
///
/// Returns false once the coordinator is gone and the caller should stop
/// producing requests.
pub async fn submit_request(request_tx: &mpsc::Sender<RunRequest>, timestamp: Instant) -> bool {
    let (done_tx, done_rx) = oneshot::channel();
    let request = RunRequest {
        timestamp,
        done: done_tx,
    };
    if request_tx.send(request).await.is_err() {
        return false;
    }
    done_rx.await.is_ok()
}

/// Trait abstracting how the coordinator runs the configured command.
///
/// Production code uses [`ProcessRunner`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait RunnerBackend: Send {
    /// Run the command once, to completion or failure.
    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
