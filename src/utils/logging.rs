//! Logging system initialization
//!
//! Sets up tracing-based logging. Without a log directory, events go to stderr.
//! With one, they go to `camsync.log` inside it, and existing logs are rotated on
//! startup keeping 10 sessions.

use crate::error::{CamSyncError, Result, StringError};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt};

/// Maximum number of historical log files to keep (camsync.log.1 through camsync.log.9)
const MAX_LOG_FILES: u8 = 9;

/// Log file name inside the log directory
pub const LOG_FILE_NAME: &str = "camsync.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system
///
/// Log level defaults to INFO but can be configured via `RUST_LOG` environment variable.
pub fn init_logging(log_dir: Option<&Path>) -> Result<()> {
    match log_dir {
        None => {
            let subscriber = fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter())
                .with_target(false)
                .finish();

            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| CamSyncError::ConfigError(Box::new(e)))?;
        }
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            rotate_logs_on_startup(&log_dir.join(LOG_FILE_NAME))?;

            // RollingFileAppender has no startup-based rotation, so it is done above
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix("camsync")
                .filename_suffix("log")
                .build(log_dir)
                .map_err(|e| CamSyncError::ConfigError(Box::new(e)))?;

            let subscriber = fmt()
                .with_writer(file_appender)
                .with_env_filter(env_filter())
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .finish();

            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| CamSyncError::ConfigError(Box::new(e)))?;
        }
    }

    tracing::info!("camsync v{} started", env!("CARGO_PKG_VERSION"));

    Ok(())
}

/// Rotate log files on application startup
///
/// - camsync.log.9 is deleted (oldest log)
/// - camsync.log.N -> camsync.log.N+1 for N in 8..=1
/// - camsync.log -> camsync.log.1
///
/// A fresh camsync.log is created by the logger afterwards.
fn rotate_logs_on_startup(log_path: &Path) -> Result<()> {
    if !log_path.exists() {
        return Ok(());
    }

    let log_dir = log_path
        .parent()
        .ok_or_else(|| CamSyncError::ConfigError(StringError::new("Invalid log path")))?;

    let log_name = log_path
        .file_name()
        .ok_or_else(|| CamSyncError::ConfigError(StringError::new("Invalid log filename")))?
        .to_string_lossy();

    let oldest_log = log_dir.join(format!("{log_name}.{MAX_LOG_FILES}"));
    if oldest_log.exists() {
        std::fs::remove_file(&oldest_log)?;
    }

    for i in (1..MAX_LOG_FILES).rev() {
        let current_log = log_dir.join(format!("{log_name}.{i}"));
        let next_log = log_dir.join(format!("{log_name}.{}", i + 1));

        if current_log.exists() {
            std::fs::rename(&current_log, &next_log)?;
        }
    }

    std::fs::rename(log_path, log_dir.join(format!("{log_name}.1")))?;

    Ok(())
}
