//! Cache storage trait and the JSON file implementation.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::traits::Cacheable;
use crate::backup::BackupManager;
use crate::error::CacheError;

/// A collection read back from storage.
#[derive(Debug, Clone)]
pub struct CachedCollection<T> {
  /// The cached entities in order
  pub entities: Vec<T>,
  /// When the collection was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// A backend holds exactly one collection which is written, read and
/// invalidated as a whole.
pub trait CacheStorage: Send + Sync {
  /// Read the collection. `Ok(None)` means cold.
  fn read<T: Cacheable>(&self) -> Result<Option<CachedCollection<T>>, CacheError>;

  /// Replace the collection.
  fn write<T: Cacheable>(&self, entities: &[T]) -> Result<(), CacheError>;

  /// Drop the collection. Succeeds if there was nothing to drop.
  fn invalidate(&self) -> Result<(), CacheError>;
}

/// What to do when the cache file exists but cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptPolicy {
  /// Log a warning and behave as if the cache were cold
  #[default]
  Absent,
  /// Surface the parse failure to the caller
  Error,
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn read<T: Cacheable>(&self) -> Result<Option<CachedCollection<T>>, CacheError> {
    Ok(None) // Always miss
  }

  fn write<T: Cacheable>(&self, _entities: &[T]) -> Result<(), CacheError> {
    Ok(()) // Discard
  }

  fn invalidate(&self) -> Result<(), CacheError> {
    Ok(())
  }
}

/// Stores the collection as a JSON array in a single file.
///
/// Existence of the file is the cache-hit signal; its modification time is
/// reported as `cached_at`.
pub struct FileStorage {
  path: PathBuf,
  on_corrupt: CorruptPolicy,
  backups: Option<BackupManager>,
}

impl FileStorage {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      on_corrupt: CorruptPolicy::default(),
      backups: None,
    }
  }

  pub fn with_corrupt_policy(mut self, policy: CorruptPolicy) -> Self {
    self.on_corrupt = policy;
    self
  }

  /// Snapshot the file into `backups` before invalidation deletes it.
  pub fn with_backups(mut self, backups: BackupManager) -> Self {
    self.backups = Some(backups);
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn io_error(&self, source: std::io::Error) -> CacheError {
    CacheError::Io {
      path: self.path.clone(),
      source,
    }
  }

  fn modified_at(&self) -> DateTime<Utc> {
    fs::metadata(&self.path)
      .and_then(|m| m.modified())
      .map(DateTime::<Utc>::from)
      .unwrap_or_else(|_| Utc::now())
  }
}

impl CacheStorage for FileStorage {
  fn read<T: Cacheable>(&self) -> Result<Option<CachedCollection<T>>, CacheError> {
    let contents = match fs::read(&self.path) {
      Ok(contents) => contents,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(self.io_error(e)),
    };

    let entities: Vec<T> = match serde_json::from_slice(&contents) {
      Ok(entities) => entities,
      Err(e) => match self.on_corrupt {
        CorruptPolicy::Absent => {
          tracing::warn!(
            path = %self.path.display(),
            error = %e,
            entity = T::entity_type(),
            "cache file is corrupt, treating cache as cold"
          );
          return Ok(None);
        }
        CorruptPolicy::Error => {
          return Err(CacheError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
          });
        }
      },
    };

    Ok(Some(CachedCollection {
      entities,
      cached_at: self.modified_at(),
    }))
  }

  fn write<T: Cacheable>(&self, entities: &[T]) -> Result<(), CacheError> {
    let data = serde_json::to_vec_pretty(entities)?;

    // Ensure parent directory exists
    let parent = match self.path.parent() {
      Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
      _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| self.io_error(e))?;

    // Write beside the target and rename so readers never see a partial file
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| self.io_error(e))?;
    tmp.write_all(&data).map_err(|e| self.io_error(e))?;
    tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
    tmp
      .persist(&self.path)
      .map_err(|e| self.io_error(e.error))?;

    tracing::debug!(
      path = %self.path.display(),
      count = entities.len(),
      entity = T::entity_type(),
      "cache written"
    );
    Ok(())
  }

  fn invalidate(&self) -> Result<(), CacheError> {
    if !self.path.exists() {
      return Ok(());
    }

    let file_name = self.path.file_name().and_then(|n| n.to_str());
    if let (Some(backups), Some(file_name)) = (&self.backups, file_name) {
      match backups.delete_file(file_name, true) {
        Ok(()) => return Ok(()),
        Err(e) => {
          // A failed snapshot must not block the refresh
          tracing::warn!(path = %self.path.display(), error = %e, "cache backup failed");
        }
      }
    }

    match fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(self.io_error(e)),
    }
  }
}
