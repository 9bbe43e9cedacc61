//! Tracing initialization for the MCP server.
//!
//! Logs always go to stderr: on the stdio transport stdout is the JSON-RPC
//! channel and must carry nothing else.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls the log level and filtering. Examples:
//!   - `RUST_LOG=debug` - Enable debug logging for all modules
//!   - `RUST_LOG=azure_image_mcp=debug` - Enable debug for the server crate
//!   - `RUST_LOG=warn,azure_image_mcp_common=debug` - Warn by default, debug for common
//!
//! [`init_tracing_with_log_dir`] can add a second copy of the log in a daily
//! rolling file named `mcp_server.YYYY-MM-DD.log`.

use std::path::Path;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, MakeWriter, format::FmtSpan},
    prelude::*,
    util::TryInitError,
};

/// File name prefix of the daily log file.
pub const LOG_FILE_PREFIX: &str = "mcp_server";

/// Flushes the file log when dropped. Hold it for the life of the process.
pub type FileLogGuard = tracing_appender::non_blocking::WorkerGuard;

/// Errors from setting up logging.
#[derive(Debug, thiserror::Error)]
pub enum TracingInitError {
    #[error("Failed to open log directory: {0}")]
    LogDir(#[from] InitError),

    #[error("Tracing already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
}

fn file_layer<S, W>(writer: W) -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_span_events(FmtSpan::NONE)
}

/// A daily rolling appender writing `mcp_server.YYYY-MM-DD.log` under `dir`.
///
/// The directory is created if it does not exist.
pub fn daily_file_appender(dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Defaults to `info` when `RUST_LOG` is not set.
///
/// # Panics
///
/// This function will panic if called more than once, as the global
/// subscriber can only be set once.
///
/// # Example
///
/// ```no_run
/// use azure_image_mcp_common::tracing::init_tracing;
///
/// init_tracing();
/// tracing::info!("Server starting");
/// ```
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Initialize tracing with a custom default level used when `RUST_LOG` is unset.
pub fn init_tracing_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize tracing, returning an error if already initialized.
///
/// Unlike `init_tracing()`, this function does not panic if the subscriber
/// is already set, which makes it safe to call from tests.
///
/// ```
/// use azure_image_mcp_common::tracing::try_init_tracing;
///
/// // Ok or Err depending on prior initialization, never a panic
/// let _ = try_init_tracing();
/// ```
pub fn try_init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(stderr_layer())
        .try_init()
}

/// Initialize tracing on stderr and, when `log_dir` is given, also in a
/// daily log file under it.
///
/// The returned guard must be kept alive: dropping it flushes and stops the
/// file writer.
///
/// ```no_run
/// use std::path::Path;
/// use azure_image_mcp_common::tracing::init_tracing_with_log_dir;
///
/// let _guard = init_tracing_with_log_dir(Some(Path::new("logs"))).unwrap();
/// tracing::info!("Written to stderr and logs/mcp_server.<date>.log");
/// ```
pub fn init_tracing_with_log_dir(
    log_dir: Option<&Path>,
) -> Result<Option<FileLogGuard>, TracingInitError> {
    let (file, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(daily_file_appender(dir)?);
            (Some(file_layer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(stderr_layer())
        .with(file)
        .try_init()?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_tracing_does_not_panic() {
        let _ = try_init_tracing();
        // A second attempt must report an error instead of panicking.
        assert!(try_init_tracing().is_err());
    }

    #[test]
    fn test_env_filter_parses_module_specific() {
        assert!(EnvFilter::try_new("warn,azure_image_mcp_common=debug").is_ok());
        assert!(EnvFilter::try_new("azure_image_mcp=notalevel").is_err());
    }

    #[test]
    fn test_file_layer_writes_daily_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let appender = daily_file_appender(&log_dir).unwrap();
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let subscriber = tracing_subscriber::registry().with(file_layer(writer));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(caller = "tester", "Written to the daily file");
        });
        drop(guard);

        let files: Vec<_> = std::fs::read_dir(&log_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("mcp_server."), "got {}", name);
        assert!(name.ends_with(".log"), "got {}", name);

        let contents = std::fs::read_to_string(&files[0]).unwrap();
        assert!(contents.contains("Written to the daily file"));
        assert!(contents.contains("INFO"));
        assert!(!contents.contains('\u{1b}'));
    }

    #[test]
    fn test_log_dir_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let err = init_tracing_with_log_dir(Some(&blocker.join("logs"))).unwrap_err();
        assert!(matches!(err, TracingInitError::LogDir(_)));
    }
}
