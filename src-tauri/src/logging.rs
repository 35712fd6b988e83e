//! Logging Module
//!
//! Structured logging to a daily log file (and the console in debug
//! builds). Request and session events from the client land here.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Overrides the log directory.
pub const LOG_DIR_VAR: &str = "GROWTH_TRACKER_LOG_DIR";

const LOG_FILE: &str = "growth-tracker.log";

/// Keeps the background log writer alive; drop it on shutdown to flush.
pub struct LogGuard {
    pub directory: PathBuf,
    _writer: WorkerGuard,
}

/// Initialize logging with console and file output
pub fn init() -> LogGuard {
    let directory = log_directory();
    let _ = std::fs::create_dir_all(&directory);

    let (writer, guard) =
        tracing_appender::non_blocking(RollingFileAppender::new(Rotation::DAILY, &directory, LOG_FILE));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer);

    #[cfg(debug_assertions)]
    let console_layer = Some(fmt::layer().with_target(true).pretty());

    #[cfg(not(debug_assertions))]
    let console_layer: Option<fmt::Layer<_>> = None;

    let subscriber = tracing_subscriber::registry()
        .with(filter())
        .with(file_layer)
        .with(console_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);

    LogGuard {
        directory,
        _writer: guard,
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if cfg!(debug_assertions) { "debug" } else { "info" };
        EnvFilter::new(format!(
            "{level},hyper=warn,reqwest=warn,cookie_store=warn,growth_tracker_lib={level}"
        ))
    })
}

fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_VAR) {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("GrowthTracker")
        .join("logs")
}
