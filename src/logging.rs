//! Tracing subscriber setup.
//!
//! One-shot commands log to stderr. The TUI owns the terminal, so while it
//! runs logs go to a file in the studymate home instead.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

/// Filter directive for the `-v` count and `-q` flag
pub fn filter_directive(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,studymate=debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the flags when set.
pub fn init(verbose: u8, quiet: bool, target: LogTarget<'_>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbose, quiet)));

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
    }

    Ok(())
}
