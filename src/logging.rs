//! Logging setup (spec §6).
//!
//! Three rolling log files — debug, info, error — each filtered to its
//! own level, plus a console layer gated by the configured `log_level`,
//! following the teacher's `tracing_subscriber::registry()` +
//! `filter::Targets` shape in `main.rs`, extended with
//! `tracing-appender` non-blocking file sinks (grounded in the
//! `angstrom` repo's Cargo.toml, the pack's other user of that crate).

use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter, fmt, prelude::*};

use crate::config::LogLevel;

/// Guards returned by the file appenders; must be held for the
/// lifetime of the process or buffered log lines are dropped on exit.
pub struct LoggingGuards {
    _debug: WorkerGuard,
    _info: WorkerGuard,
    _error: WorkerGuard,
}

/// Initializes the global tracing subscriber: console output at
/// `log_level`, plus `logs/debug.log` (all levels), `logs/info.log`
/// (info and above), `logs/error.log` (error only). File permissions
/// are tightened to 0600 on unix since these may contain addresses and
/// transaction detail.
pub fn init(log_level: LogLevel, log_dir: impl AsRef<Path>) -> Result<LoggingGuards> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    // `never` rather than `daily`/`hourly`: the three log names are
    // fixed paths (`logs/debug.log` etc.), not date-suffixed rotation.
    let debug_appender = tracing_appender::rolling::never(log_dir, "debug.log");
    let info_appender = tracing_appender::rolling::never(log_dir, "info.log");
    let error_appender = tracing_appender::rolling::never(log_dir, "error.log");

    let (debug_writer, debug_guard) = tracing_appender::non_blocking(debug_appender);
    let (info_writer, info_guard) = tracing_appender::non_blocking(info_appender);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);

    let console_level = match log_level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    };

    let console_layer = fmt::layer().with_filter(filter::LevelFilter::from_level(console_level));
    let debug_layer = fmt::layer()
        .with_writer(debug_writer)
        .with_ansi(false)
        .with_filter(filter::LevelFilter::from_level(Level::DEBUG));
    let info_layer = fmt::layer()
        .with_writer(info_writer)
        .with_ansi(false)
        .with_filter(filter::LevelFilter::from_level(Level::INFO));
    let error_layer = fmt::layer()
        .with_writer(error_writer)
        .with_ansi(false)
        .with_filter(filter::LevelFilter::from_level(Level::ERROR));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(debug_layer)
        .with(info_layer)
        .with(error_layer)
        .init();

    for name in ["debug.log", "info.log", "error.log"] {
        tighten_permissions(&log_dir.join(name));
    }

    Ok(LoggingGuards {
        _debug: debug_guard,
        _info: info_guard,
        _error: error_guard,
    })
}

#[cfg(unix)]
fn tighten_permissions(path: &Path) {
    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn tighten_permissions(_path: &Path) {}
