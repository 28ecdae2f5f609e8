//! Global `tracing` subscriber installation
//!
//! Output goes to stdout (human-readable or JSON) and, when a directory is
//! configured, to a daily rolling file written as JSON through a
//! non-blocking worker.

use farmgate_domain::constants::LOG_FILE_PREFIX;
use farmgate_domain::{FarmgateError, LoggingSettings, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Keeps the file writer alive; pending lines are flushed on drop
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    file_writer: Option<WorkerGuard>,
}

impl LoggingGuard {
    pub fn writes_to_file(&self) -> bool {
        self.file_writer.is_some()
    }
}

/// Install the global subscriber described by `settings`
///
/// `RUST_LOG`, when set, takes precedence over `settings.filter`.
///
/// # Errors
/// Returns `FarmgateError::Config` for an invalid filter directive,
/// `FarmgateError::Io` if the log directory cannot be created, and
/// `FarmgateError::Internal` if a global subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<LoggingGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter).map_err(|e| {
            FarmgateError::Config(format!("Invalid log filter '{}': {e}", settings.filter))
        })?,
    };

    let (file_writer, guard) = match &settings.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let stdout_json = settings.json.then(|| fmt::layer().json().with_current_span(true));
    let stdout_text = (!settings.json).then(|| fmt::layer().with_target(true));
    let file_layer =
        file_writer.map(|writer| fmt::layer().json().with_ansi(false).with_writer(writer));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_json)
        .with(stdout_text)
        .with(file_layer)
        .try_init()
        .map_err(|e| FarmgateError::Internal(format!("Logging already initialised: {e}")))?;

    tracing::debug!(
        json = settings.json,
        directory = ?settings.directory,
        "Logging initialised"
    );
    Ok(LoggingGuard { file_writer: guard })
}
