//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Optionally mirror events as JSON into a reopenable log file
//! - Reopen that file on request (log rotation by an external tool)
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config; `RUST_LOG` overrides it
//! - File writes go through `tracing-appender`'s worker thread

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::admission::Notifier;
use crate::config::{LogFormat, ObservabilityConfig};

/// Errors from logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to open log file: {0}")]
    Io(#[from] io::Error),

    #[error("global subscriber already set: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the logging pipeline alive. Dropping it flushes buffered file output.
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
    file: Option<LogFile>,
}

impl LoggingGuard {
    /// The log file, if one was configured.
    pub fn log_file(&self) -> Option<&LogFile> {
        self.file.as_ref()
    }
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &ObservabilityConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)?,
    };

    let stderr = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
    };

    let (file_layer, worker, file) = match &config.log_file {
        Some(path) => {
            let file = LogFile::open(path)?;
            let (writer, worker) = tracing_appender::non_blocking(file.clone());
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(worker), Some(file))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .try_init()?;

    Ok(LoggingGuard { _worker: worker, file })
}

struct FileState {
    path: PathBuf,
    file: File,
}

/// An append-mode log file that can be reopened in place.
///
/// Clones share the same underlying handle.
#[derive(Clone)]
pub struct LogFile {
    state: Arc<Mutex<FileState>>,
}

impl LogFile {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            state: Arc::new(Mutex::new(FileState { path, file })),
        })
    }

    /// Close and reopen the current path, picking up a rotated file.
    pub fn reopen(&self) -> io::Result<()> {
        let mut state = self.lock();
        let file = open_append(&state.path)?;
        state.file = file;
        Ok(())
    }

    /// Switch output to `path`. On failure the old file stays in use.
    pub fn set_path(&self, path: impl Into<PathBuf>) -> io::Result<()> {
        let path = path.into();
        let file = open_append(&path)?;
        let mut state = self.lock();
        state.path = path;
        state.file = file;
        Ok(())
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().file.flush()
    }
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile").field("path", &self.path()).finish()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Reopen `file` every time `notifier` is signalled. Bursts collapse into one reopen.
pub fn spawn_reopen_task(file: LogFile, notifier: Notifier) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            notifier.consume().await;
            match file.reopen() {
                Ok(()) => tracing::info!(path = %file.path().display(), "Log file reopened"),
                Err(e) => tracing::error!(path = %file.path().display(), error = %e, "Failed to reopen log file"),
            }
        }
    })
}
