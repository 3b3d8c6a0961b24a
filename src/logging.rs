//! Logging setup for formfill.
//!
//! Console output goes to stderr so that commands printing JSON keep stdout
//! clean. Unless disabled, two daily-rotated files are written as well:
//!
//! - `formfill.<date>.log`: everything the filter lets through
//! - `error.<date>.log`: warnings and errors only
//!
//! The files live in the platform data directory (`~/.local/share/formfill/logs`
//! on Linux, `%APPDATA%\formfill\logs` on Windows) unless `FORMFILL_LOG_DIR`
//! points elsewhere.
//!
//! ```no_run
//! use formfill::logging::{self, LogOptions};
//!
//! logging::init(&LogOptions::default()).expect("Failed to initialize logging");
//! tracing::info!("Run started");
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const APP_DIR: &str = "formfill";
const LOG_DIR_ENV: &str = "FORMFILL_LOG_DIR";
const RETAINED_FILES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Default filter becomes `debug` instead of `info`; `RUST_LOG` still wins
    pub verbose: bool,
    pub write_files: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            write_files: true,
        }
    }
}

/// Gets the log directory, creating it if needed.
pub fn get_log_dir() -> Result<PathBuf> {
    let log_dir = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::data_dir()
            .context("Failed to determine data directory")?
            .join(APP_DIR)
            .join("logs"),
    };

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

fn open_log_files() -> Result<(RollingFileAppender, RollingFileAppender, PathBuf)> {
    let dir = get_log_dir()?;
    let all = file_appender(&dir, APP_DIR)?;
    let errors = file_appender(&dir, "error")?;
    Ok((all, errors, dir))
}

fn file_appender(log_dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(RETAINED_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} log appender"))
}

/// Installs the global subscriber. Returns the log directory when file
/// logging is active.
///
/// If the log directory cannot be used, logging continues on the console
/// only and a warning is emitted.
///
/// # Errors
///
/// Returns an error if the filter cannot be built.
pub fn init(options: &LogOptions) -> Result<Option<PathBuf>> {
    let default_level = if options.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Failed to create env filter")?;

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    let mut file_error = None;
    let (all_logs, error_logs, log_dir) = if options.write_files {
        match open_log_files() {
            Ok((all, errors, dir)) => (Some(all), Some(errors), Some(dir)),
            Err(err) => {
                file_error = Some(err);
                (None, None, None)
            }
        }
    } else {
        (None, None, None)
    };

    let all_logs_layer = all_logs.map(|writer| {
        fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(writer)
    });
    let error_logs_layer = error_logs.map(|writer| {
        fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(EnvFilter::new("warn"))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .init();

    if let Some(err) = file_error {
        tracing::warn!("File logging disabled: {err:#}");
    }
    if let Some(dir) = &log_dir {
        tracing::debug!("Logging initialized, log directory: {}", dir.display());
    }

    Ok(log_dir)
}

/// Gets the path to today's log file
pub fn get_current_log_path() -> Result<PathBuf> {
    let log_dir = get_log_dir()?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    Ok(log_dir.join(format!("{APP_DIR}.{today}.log")))
}
