//! Error taxonomy shared by the pipeline, the cache and the HTTP layer.

use std::path::PathBuf;
use thiserror::Error;

use crate::backup::BackupError;
use crate::hackmd::UpstreamError;

/// Errors produced by the cache store.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The backing file exists but does not parse as a post collection.
  #[error("cache file {} is corrupt: {message}", .path.display())]
  Corrupt { path: PathBuf, message: String },

  #[error("cache I/O failed for {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize cache collection: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// A required field was missing from an upstream record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed upstream record {}: missing {field}", .id.as_deref().unwrap_or("<no id>"))]
pub struct MalformedRecord {
  pub id: Option<String>,
  pub field: &'static str,
}

/// Errors surfaced by the fetch pipeline.
#[derive(Debug, Error)]
pub enum Error {
  #[error("fetch failed: {cause}")]
  FetchFailed {
    #[source]
    cause: UpstreamError,
  },

  #[error(transparent)]
  MalformedUpstreamRecord(#[from] MalformedRecord),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error(transparent)]
  Backup(#[from] BackupError),

  #[error("post not found: {slug}")]
  NotFound { slug: String },
}

impl From<UpstreamError> for Error {
  fn from(cause: UpstreamError) -> Self {
    Error::FetchFailed { cause }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
