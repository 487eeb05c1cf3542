//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once settings are resolved
//! - Route output to stdout or an append-only log file
//! - Pick the level from `verbose`, unless `RUST_LOG` says otherwise

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot create a log file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("logging already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Default filter directive for the given verbosity.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Open `path` for appending, creating it owner-readable only.
pub fn open_log_file(path: &str) -> Result<File, LoggingError> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|source| LoggingError::File {
        path: PathBuf::from(path),
        source,
    })
}

/// Install the global subscriber.
///
/// The returned guard flushes buffered lines on drop and must be kept alive
/// until the process exits.
pub fn init_logging(verbose: bool, output: &str) -> Result<WorkerGuard, LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let to_file = !output.is_empty();
    let (writer, guard) = if to_file {
        tracing_appender::non_blocking(open_log_file(output)?)
    } else {
        tracing_appender::non_blocking(io::stdout())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(!to_file),
        )
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(true), "debug");
        assert_eq!(default_directive(false), "info");
    }

    #[test]
    fn test_log_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.log");
        let path = path.to_str().unwrap();

        writeln!(open_log_file(path).unwrap(), "first").unwrap();
        writeln!(open_log_file(path).unwrap(), "second").unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "first\nsecond\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_log_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.log");
        open_log_file(path.to_str().unwrap()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_unwritable_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_log_file(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("cannot create a log file"));
    }
}
