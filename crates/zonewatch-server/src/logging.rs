//! Logging setup.
//!
//! Production writes JSON lines to a daily rolling file and compact text to
//! stdout for the service manager. Development writes pretty, coloured
//! output with span open/close events.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fallback level variable, consulted when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "ZONEWATCH_LOG_LEVEL";

/// Overrides the directory rolling log files are written to.
pub const LOG_DIR_ENV: &str = "ZONEWATCH_LOG_DIR";

/// Prefix of the rolling log files (`zonewatch.YYYY-MM-DD`).
const LOG_FILE_PREFIX: &str = "zonewatch";

const DEFAULT_LEVEL: &str = "info";

/// Flush guards for the non-blocking writers. Dropping one loses buffered
/// lines, so they live for the whole process.
static GUARDS: OnceLock<[WorkerGuard; 2]> = OnceLock::new();

/// Install the global subscriber.
///
/// # Errors
///
/// Fails when the level directive does not parse, the log directory cannot
/// be created, or a subscriber is already installed.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let filter = env_filter()?;

    if is_production {
        init_production(filter)
    } else {
        init_development(filter)
    }
}

/// `RUST_LOG` wins; otherwise [`LOG_LEVEL_ENV`]; otherwise `info`.
fn env_filter() -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| DEFAULT_LEVEL.to_string());
    EnvFilter::try_new(&level).with_context(|| format!("Invalid {LOG_LEVEL_ENV} value '{level}'"))
}

fn init_production(filter: EnvFilter) -> anyhow::Result<()> {
    let (file_writer, file_guard) = rolling_file_writer()?;
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // journald adds its own timestamps and does not render ANSI
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_target(true)
        .without_time()
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    let _ = GUARDS.set([file_guard, stdout_guard]);
    Ok(())
}

fn init_development(filter: EnvFilter) -> anyhow::Result<()> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .try_init()?;
    Ok(())
}

fn rolling_file_writer() -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let dir = log_directory();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Cannot create log directory {}", dir.display()))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

/// Log directory: [`LOG_DIR_ENV`], else `/var/log/zonewatch` on Linux, else
/// the platform data directory.
fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    default_log_directory()
}

#[cfg(target_os = "linux")]
fn default_log_directory() -> PathBuf {
    PathBuf::from("/var/log/zonewatch")
}

#[cfg(not(target_os = "linux"))]
fn default_log_directory() -> PathBuf {
    directories::ProjectDirs::from("", "", "zonewatch")
        .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
}
