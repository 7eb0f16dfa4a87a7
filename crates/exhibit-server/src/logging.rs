//! Logging initialization and configuration.
//!
//! - **Production**: JSON logs to daily rolling files plus compact stdout
//!   for the systemd journal
//! - **Development**: pretty stdout with span events
//!
//! The filter comes from `RUST_LOG`, then `EXHIBIT_LOG_LEVEL`, then `info`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Non-blocking writer guards; dropping one stops its writer.
static GUARDS: OnceLock<[WorkerGuard; 2]> = OnceLock::new();

mod env_vars {
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const LOG_LEVEL: &str = "EXHIBIT_LOG_LEVEL";
    pub const LOG_DIR: &str = "EXHIBIT_LOG_DIR";
}

const DEFAULT_LEVEL: &str = "info";
const LOG_FILE_PREFIX: &str = "exhibit-tag";

/// Initialize the logging system.
///
/// # Errors
///
/// Returns an error if the filter directive cannot be parsed or a global
/// subscriber is already installed.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let directive = filter_directive(
        std::env::var(env_vars::RUST_LOG).ok(),
        std::env::var(env_vars::LOG_LEVEL).ok(),
    );
    let env_filter = EnvFilter::try_new(&directive)?;

    if is_production {
        init_production(env_filter, &log_directory(std::env::var_os(env_vars::LOG_DIR)))?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    tracing::debug!(%directive, is_production, "Logging initialized");
    Ok(())
}

fn init_production(env_filter: EnvFilter, log_dir: &Path) -> anyhow::Result<()> {
    if let Err(err) = std::fs::create_dir_all(log_dir) {
        eprintln!("Cannot create log directory {}: {err}", log_dir.display());
    }

    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_ansi(false),
        )
        .try_init()?;

    let _ = GUARDS.set([file_guard, stdout_guard]);
    Ok(())
}

/// Picks the filter directive: `RUST_LOG` wins, then the level variable.
fn filter_directive(rust_log: Option<String>, level: Option<String>) -> String {
    [rust_log, level]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

/// Returns the log directory, honoring an explicit override.
fn log_directory(overridden: Option<std::ffi::OsString>) -> PathBuf {
    if let Some(dir) = overridden.filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/exhibit-tag")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "exhibit-tag")
            .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_takes_precedence() {
        let directive = filter_directive(
            Some("exhibit_core=trace".to_string()),
            Some("warn".to_string()),
        );
        assert_eq!(directive, "exhibit_core=trace");
    }

    #[test]
    fn test_level_variable_is_fallback() {
        assert_eq!(filter_directive(None, Some("debug".to_string())), "debug");
        assert_eq!(
            filter_directive(Some("  ".to_string()), Some("warn".to_string())),
            "warn"
        );
        assert_eq!(filter_directive(None, None), "info");
    }

    #[test]
    fn test_log_directory_override() {
        let dir = log_directory(Some("/tmp/exhibit-logs".into()));
        assert_eq!(dir, PathBuf::from("/tmp/exhibit-logs"));
    }

    #[test]
    fn test_default_log_directory_is_valid_path() {
        let dir = log_directory(None);
        assert!(dir.ends_with("exhibit-tag") || dir.ends_with("logs"));
    }
}
