//! Subscriber setup: console output plus an optional plain-text log file.

use anyhow::{Context, Result};
use duet_core::{LogConfig, LogFormat};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(config: &LogConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else if config.level.trim().is_empty() {
        "info".to_string()
    } else {
        config.level.clone()
    }
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the process.
pub fn init_logging(config: &LogConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let directive = default_directive(config, verbose);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .with_context(|| format!("Invalid log level {directive:?}"))?;

    let console = match config.format {
        LogFormat::Full => fmt::layer().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    };

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Logging was already initialized")?;

    Ok(guard)
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .with_context(|| format!("Log file {} has no file name", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_verbose_overrides_level() {
        let config = LogConfig {
            level: "warn".to_string(),
            ..LogConfig::default()
        };
        assert_eq!(default_directive(&config, false), "warn");
        assert_eq!(default_directive(&config, true), "debug");
    }

    #[test]
    fn test_blank_level_falls_back_to_info() {
        let config = LogConfig {
            level: "  ".to_string(),
            ..LogConfig::default()
        };
        assert_eq!(default_directive(&config, false), "info");
    }

    #[test]
    fn test_file_writer_creates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs").join("duet.log");

        let (_writer, guard) = file_writer(&path).unwrap();
        drop(guard);

        assert!(temp.path().join("logs").is_dir());
    }

    #[test]
    fn test_dropping_guard_flushes_file_log() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("duet.log");

        let (writer, guard) = file_writer(&path).unwrap();
        let subscriber = fmt()
            .with_writer(writer)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(reason = "identity_1 failed", "Conversation finished");
        });
        // What `main` does before `process::exit`.
        drop(guard);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Conversation finished"));
        assert!(written.contains("identity_1 failed"));
    }

    #[test]
    fn test_file_writer_rejects_path_without_name() {
        assert!(file_writer(Path::new("/")).is_err());
    }
}
