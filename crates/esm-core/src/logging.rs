//! Tracing subscriber setup with an explicit sink.
//!
//! The sink is chosen once at startup: stderr for foreground use, or an
//! append-only file for a daemon detached from its terminal.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use esm_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Where log events are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    File(PathBuf),
}

impl LogSink {
    /// The configured file, or stderr.
    pub fn from_config(config: &LoggingConfig) -> Self {
        match &config.file {
            Some(path) => LogSink::File(path.clone()),
            None => LogSink::Stderr,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Filter directive for a configured level raised by `-v` flags.
pub fn directive(level: &str, verbosity: u8) -> String {
    match verbosity {
        0 => level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// `RUST_LOG` if set, otherwise [`directive`].
pub fn env_filter(level: &str, verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level, verbosity)))
}

/// Open `path` for appending, creating parent directories.
pub fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let open_error = |source| LoggingError::Open {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(open_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(open_error)
}

/// Install the global subscriber.
pub fn init(level: &str, verbosity: u8, sink: &LogSink) -> Result<(), LoggingError> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(level, verbosity));
    let installed = match sink {
        LogSink::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogSink::File(path) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(open_log_file(path)?))
            .try_init(),
    };
    installed.map_err(|_| LoggingError::AlreadyInstalled)
}
