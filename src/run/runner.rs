// src/run/runner.rs

//! Command execution and output streaming.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Local;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{Result, WatchrunError};
use crate::sink::{Directive, Region, Sink};

use super::RunnerBackend;

/// Largest single write handed to the sink. Oversized writes are split so
/// the surface never receives a chunk it cannot absorb atomically.
pub const MAX_SINK_WRITE: usize = 1024;

/// Writer for the sink body region that enforces [`MAX_SINK_WRITE`].
pub struct BodyWriter<'a> {
    sink: &'a dyn Sink,
}

impl<'a> BodyWriter<'a> {
    pub fn new(sink: &'a dyn Sink) -> Self {
        Self { sink }
    }

    /// Deliver all of `data` to the body, in order, via one or more
    /// underlying writes of at most [`MAX_SINK_WRITE`] bytes each.
    pub fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = data.len().min(MAX_SINK_WRITE);
            let written = self.sink.write_region(Region::Body, &data[..n])?;
            if written == 0 {
                return Err(WatchrunError::SinkIo("sink accepted no bytes".to_string()));
            }
            data = &data[written.min(n)..];
        }
        Ok(())
    }
}

/// Runs the configured command, streaming its merged output to the sink.
pub struct ProcessRunner {
    sink: Arc<dyn Sink>,
    command: Vec<String>,
}

impl ProcessRunner {
    pub fn new(sink: Arc<dyn Sink>, command: Vec<String>) -> Self {
        Self { sink, command }
    }
}

impl RunnerBackend for ProcessRunner {
    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(run_command(Arc::clone(&self.sink), self.command.clone()))
    }
}

/// Run the command once and stream its output into the sink body.
///
/// A command that fails to start or exits non-zero is reported inline in
/// the body; only sink failures (and an empty command line) surface as
/// errors. The completion timestamp line and the final reveal sequence are
/// written on every path through this function.
pub async fn run_command(sink: Arc<dyn Sink>, command: Vec<String>) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        return Err(WatchrunError::Setup("must supply a command".to_string()));
    };
    let cmd_str = command.join(" ");
    info!(command = %cmd_str, "running command");

    // Replace whatever the body currently holds with the start banner.
    sink.control(Directive::SetSelectionToAddress(",".to_string()))?;
    sink.write_region(Region::Data, &[])?;
    sink.control(Directive::MarkClean)?;

    let mut body = BodyWriter::new(sink.as_ref());
    body.write_all(format!("$ {cmd_str}\n").as_bytes())?;

    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Err(err) => {
            warn!(command = %cmd_str, error = %err, "failed to start command");
            body.write_all(format!("{cmd_str}: {err}\n").as_bytes())?;
        }
        Ok(mut child) => {
            let mut chunks = merge_output(&mut child);
            while let Some(chunk) = chunks.recv().await {
                body.write_all(&chunk)?;
            }
            match child.wait().await {
                Ok(status) if !status.success() => {
                    body.write_all(format!("{cmd_str}: {status}\n").as_bytes())?;
                }
                Ok(_) => {}
                Err(err) => {
                    body.write_all(format!("{cmd_str}: {err}\n").as_bytes())?;
                }
            }
        }
    }

    body.write_all(format!("{}\n", Local::now()).as_bytes())?;
    sink.control(Directive::SetSelectionToAddress("#0".to_string()))?;
    sink.control(Directive::ShowSelection)?;
    sink.control(Directive::MarkClean)?;
    Ok(())
}

/// Merge the child's stdout and stderr into one chunk stream, in arrival
/// order. The receiver ends once both pipes are drained.
fn merge_output(child: &mut tokio::process::Child) -> mpsc::Receiver<Vec<u8>> {
    let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(16);
    if let Some(stdout) = child.stdout.take() {
        spawn_pipe_reader(stdout, chunk_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_pipe_reader(stderr, chunk_tx);
    }
    chunk_rx
}

fn spawn_pipe_reader<P>(mut pipe: P, chunk_tx: mpsc::Sender<Vec<u8>>)
where
    P: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; MAX_SINK_WRITE];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if chunk_tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "command output pipe read failed");
                    break;
                }
            }
        }
    });
}
