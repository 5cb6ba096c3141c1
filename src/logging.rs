//! Tracing subscriber setup.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.filter`. Logs always go to stderr, and also
/// to `config.file` when set. Keep the returned guard alive for as long as
/// the file writer should flush.
pub fn init(config: &LogConfig) -> Option<WorkerGuard> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

  let (file_writer, guard) = match &config.file {
    Some(path) => {
      let (dir, name) = split_log_path(path);
      let appender = tracing_appender::rolling::never(dir, name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (Some(writer), Some(guard))
    }
    None => (None, None),
  };

  let registry = tracing_subscriber::registry().with(filter);
  let result = if config.json {
    registry
      .with(fmt::layer().json().with_writer(std::io::stderr))
      .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
      .try_init()
  } else {
    registry
      .with(fmt::layer().with_writer(std::io::stderr))
      .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
      .try_init()
  };

  if let Err(e) = result {
    eprintln!("logging already initialized: {}", e);
  }

  tracing::debug!(filter = %config.filter, json = config.json, "logging initialized");
  guard
}

/// Directory and file name for the log appender.
fn split_log_path(path: &Path) -> (PathBuf, PathBuf) {
  let dir = match path.parent() {
    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
    _ => PathBuf::from("."),
  };
  let name = path
    .file_name()
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("hackpost.log"));
  (dir, name)
}
