use std::io;
use std::path::PathBuf;

use chrono::Local;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Default)]
pub struct TracingOptions {
    /// Raise the default filter from `info` to `debug`.
    pub verbose: bool,
    /// Also write the log to a timestamp-named file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl TracingOptions {
    fn default_directives(&self) -> &'static str {
        if self.verbose {
            "info,chatprobe=debug,chatprobe_core=debug"
        } else {
            "info,chatprobe=info"
        }
    }
}

/// Initialize the tracing system. Logs go to stderr and, when a log
/// directory is configured, to a file in it. `RUST_LOG` takes precedence
/// over the default filter.
///
/// Returns the path of the log file, if one was opened. Calling this twice is
/// harmless: the second subscriber is simply not installed.
pub fn init_tracing(options: &TracingOptions) -> io::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_directives()));
    let stderr_layer = fmt::Layer::default()
        .with_writer(io::stderr)
        .with_target(false);

    let Some(log_dir) = &options.log_dir else {
        let _ = tracing_subscriber::registry()
            .with(stderr_layer)
            .with(filter)
            .try_init();
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)?;
    let file_name = format!("{}.log", Local::now().format("%Y%m%d_%H%M%S"));
    let file_appender = rolling::never(log_dir, &file_name);

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(
            fmt::Layer::new()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init();

    let path = log_dir.join(file_name);
    tracing::debug!(
        target: "chatprobe::utils::tracing",
        path = %path.display(),
        "Tracing initialized with file output"
    );
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn verbose_raises_default_level() {
        let quiet = TracingOptions::default();
        let verbose = TracingOptions {
            verbose: true,
            ..TracingOptions::default()
        };
        assert!(quiet.default_directives().starts_with("info"));
        assert!(verbose.default_directives().contains("chatprobe=debug"));
    }

    #[test]
    fn creates_log_file_in_log_dir() {
        let dir = TempDir::new().unwrap();
        let path = init_tracing(&TracingOptions {
            verbose: false,
            log_dir: Some(dir.path().join("logs")),
        })
        .unwrap()
        .unwrap();

        assert!(path.starts_with(dir.path().join("logs")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("log"));
    }
}
