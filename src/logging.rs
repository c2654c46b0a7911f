// src/logging.rs

//! Log output setup.
//!
//! Logs go to stderr; stdout belongs to the sink adapter. The filter is
//! taken from the `--log-level` flag when given, otherwise from the
//! `WATCHRUN_LOG` environment variable (which accepts full filter
//! directives such as `watchrun=debug`), otherwise `info`.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_env("WATCHRUN_LOG")
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
