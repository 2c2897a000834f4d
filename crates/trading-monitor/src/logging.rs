//! Logging setup.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Setup logging with the given level.
///
/// `RUST_LOG` overrides `level` when set. With `file`, records are also
/// written as JSON to a daily-rolling file next to it; the returned guard
/// must be held until exit or buffered lines are lost.
pub fn setup_logging(level: &str, json: bool, file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().compact().with_target(true).boxed()
    };

    let (file_layer, guard) = match file {
        Some(path) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(rolling_appender(path)?);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(guard)
}

fn rolling_appender(path: &Path) -> io::Result<tracing_appender::rolling::RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log file path has no file name"))?;
    std::fs::create_dir_all(dir)?;
    Ok(tracing_appender::rolling::daily(dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_appender_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs").join("session.log");
        rolling_appender(&path).unwrap();
        assert!(tmp.path().join("logs").is_dir());
    }

    #[test]
    fn test_rolling_appender_needs_file_name() {
        assert!(rolling_appender(Path::new("/")).is_err());
    }
}
