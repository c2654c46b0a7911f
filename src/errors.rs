// src/errors.rs

//! Crate-wide error types.
//!
//! Every variant here is fatal: it propagates to the top-level handler in
//! `lib::run`, which deletes the sink best-effort and exits non-zero. A
//! failed or non-zero-exiting watched command is *not* an error in this
//! sense — the runner renders it inline in the sink body and the pipeline
//! stays live.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchrunError {
    /// Startup could not complete: sink unopenable, watch root missing,
    /// notification facility unavailable, no command given.
    #[error("setup error: {0}")]
    Setup(String),

    /// The watch root (or an ancestor of it) was removed out from under us.
    #[error("watch point {} deleted", .0.display())]
    WatchPointLost(PathBuf),

    /// A write or control call on the sink itself failed. There is nothing
    /// left to report errors *to*, so this is always fatal.
    #[error("sink I/O error: {0}")]
    SinkIo(String),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchrunError>;
