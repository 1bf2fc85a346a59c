//! File and terminal logging setup.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Global root logger.
static LOGGING_GUARDS: OnceLock<LoggingGuards> = OnceLock::new();

/// Logger thread handles, which must be kept alive for as long as the
/// logging targets will be used. Flushed automatically when dropped.
pub struct LoggingGuards {
    _stdout: WorkerGuard,
    _file: WorkerGuard,
}

/// Set up file and terminal logging.
///
/// Writes to `<log_dir>/logs/<name>.log` and stdout, with the level taken
/// from the environment (`info` fallback). Idempotent: repeat calls reuse
/// the existing root logger.
pub fn init_logging(log_dir: &Path, name: &str) -> Result<PathBuf, String> {
    // Build file writer
    let log_dir = log_dir.join("logs");
    fs::create_dir_all(&log_dir).map_err(|e| format!("Failed to create log directory: {e}"))?;
    let log_path = log_dir.join(format!("{name}.log"));

    if LOGGING_GUARDS.get().is_some() {
        return Ok(log_path);
    }

    let logfile = OpenOptions::new()
        .create(true)
        .truncate(false)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {e}"))?;

    // Build terminal and file writers
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (file_writer, file_guard) = tracing_appender::non_blocking(logfile);

    // Filter for log level
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| format!("Failed to set up logging env filter: {e}"))?;

    // Formatting for terminal logger
    let stdout_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(stdout_writer)
        .with_target(false);

    // Build file logger (with formatting) from writer
    let file_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(file_writer)
        .with_ansi(false);

    // Set up global root logger
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {e}"))?;

    let _ = LOGGING_GUARDS.set(LoggingGuards {
        _stdout: stdout_guard,
        _file: file_guard,
    });

    Ok(log_path)
}
