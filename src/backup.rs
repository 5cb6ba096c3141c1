//! Timestamped backups of JSON files in a data directory.
//!
//! Backups are named `<stem>_<timestamp>.<ext>` and live in their own
//! directory. Restoring a backup first snapshots whatever it overwrites.

use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
  #[error("file {0} not found")]
  NotFound(String),

  #[error("invalid file name: {0}")]
  InvalidName(String),

  #[error("backup I/O failed for {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> BackupError + '_ {
  move |source| BackupError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Manages backups for files under `base_dir`.
#[derive(Debug, Clone)]
pub struct BackupManager {
  base_dir: PathBuf,
  backup_dir: PathBuf,
  /// Backups kept per original file; 0 keeps everything
  max_backups: usize,
}

impl BackupManager {
  pub fn new(base_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
    Self {
      base_dir: base_dir.into(),
      backup_dir: backup_dir.into(),
      max_backups: 0,
    }
  }

  /// Keep at most `max_backups` copies of each file, dropping the oldest.
  pub fn with_max_backups(mut self, max_backups: usize) -> Self {
    self.max_backups = max_backups;
    self
  }

  /// Copy `filename` into the backup directory under a timestamped name.
  pub fn create_backup(&self, filename: &str) -> Result<PathBuf, BackupError> {
    let source = self.base_dir.join(plain_name(filename)?);
    if !source.is_file() {
      return Err(BackupError::NotFound(filename.to_string()));
    }

    fs::create_dir_all(&self.backup_dir).map_err(io_error(&self.backup_dir))?;

    let (stem, ext) = split_name(filename);
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();

    // Backups within the same millisecond get a counter suffix past any
    // existing one, so the newest always sorts last
    let next_counter = self
      .list_backups(Some(filename))?
      .iter()
      .map(|name| backup_order(name))
      .filter(|(_, ts, _)| *ts == timestamp)
      .map(|(_, _, counter)| counter + 1)
      .max();
    let tag = match next_counter {
      Some(counter) => format!("{}-{}", timestamp, counter),
      None => timestamp,
    };
    let target = self.backup_dir.join(join_name(&format!("{}_{}", stem, tag), ext));

    fs::copy(&source, &target).map_err(io_error(&target))?;
    tracing::info!(source = %source.display(), backup = %target.display(), "backup created");

    self.prune(filename)?;
    Ok(target)
  }

  /// Remove the oldest backups of `filename` beyond the retention limit.
  fn prune(&self, filename: &str) -> Result<(), BackupError> {
    if self.max_backups == 0 {
      return Ok(());
    }

    let names = self.list_backups(Some(filename))?;
    let excess = names.len().saturating_sub(self.max_backups);
    for name in &names[..excess] {
      let path = self.backup_dir.join(name);
      match fs::remove_file(&path) {
        Ok(()) => tracing::debug!(backup = %path.display(), "old backup pruned"),
        Err(e) => tracing::warn!(backup = %path.display(), error = %e, "failed to prune backup"),
      }
    }
    Ok(())
  }

  /// List backup file names oldest first, optionally only those of
  /// `original_filename`.
  pub fn list_backups(&self, original_filename: Option<&str>) -> Result<Vec<String>, BackupError> {
    let entries = match fs::read_dir(&self.backup_dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(io_error(&self.backup_dir)(e)),
    };

    let mut names: Vec<String> = entries
      .filter_map(|e| e.ok())
      .filter(|e| e.path().is_file())
      .filter_map(|e| e.file_name().into_string().ok())
      .filter(|name| match original_filename {
        Some(original) => original_name(name).as_deref() == Some(original),
        None => true,
      })
      .collect();

    names.sort_by_cached_key(|name| backup_order(name));
    Ok(names)
  }

  /// Copy a backup back over its original file.
  pub fn restore_backup(&self, backup_filename: &str) -> Result<PathBuf, BackupError> {
    let backup_path = self.backup_dir.join(plain_name(backup_filename)?);
    if !backup_path.is_file() {
      return Err(BackupError::NotFound(backup_filename.to_string()));
    }

    let original = original_name(backup_filename)
      .ok_or_else(|| BackupError::InvalidName(backup_filename.to_string()))?;
    let target = self.base_dir.join(&original);

    // Read first: snapshotting the target may prune this very backup
    let contents = fs::read(&backup_path).map_err(io_error(&backup_path))?;

    if target.exists() {
      self.create_backup(&original)?;
    }

    fs::create_dir_all(&self.base_dir).map_err(io_error(&self.base_dir))?;
    fs::write(&target, contents).map_err(io_error(&target))?;
    tracing::info!(backup = %backup_path.display(), target = %target.display(), "backup restored");
    Ok(target)
  }

  /// Remove `filename`, optionally snapshotting it first.
  pub fn delete_file(&self, filename: &str, create_backup: bool) -> Result<(), BackupError> {
    let path = self.base_dir.join(plain_name(filename)?);
    if !path.is_file() {
      return Err(BackupError::NotFound(filename.to_string()));
    }

    if create_backup {
      self.create_backup(filename)?;
    }

    fs::remove_file(&path).map_err(io_error(&path))
  }
}

/// Reject anything that would escape the managed directories.
fn plain_name(name: &str) -> Result<&str, BackupError> {
  let is_plain = !name.is_empty()
    && Path::new(name)
      .file_name()
      .map_or(false, |f| f == std::ffi::OsStr::new(name));
  if is_plain {
    Ok(name)
  } else {
    Err(BackupError::InvalidName(name.to_string()))
  }
}

fn split_name(name: &str) -> (&str, Option<&str>) {
  match name.rsplit_once('.') {
    Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
    _ => (name, None),
  }
}

fn join_name(stem: &str, ext: Option<&str>) -> String {
  match ext {
    Some(ext) => format!("{}.{}", stem, ext),
    None => stem.to_string(),
  }
}

/// `posts_cache_20240101T000000000Z.json` -> `posts_cache.json`
fn original_name(backup_filename: &str) -> Option<String> {
  let (stem, ext) = split_name(backup_filename);
  let (original_stem, tag) = stem.rsplit_once('_')?;
  if original_stem.is_empty() || !tag.starts_with(|c: char| c.is_ascii_digit()) {
    return None;
  }
  Some(join_name(original_stem, ext))
}

/// Sort key: original stem, then timestamp, then collision counter.
fn backup_order(backup_filename: &str) -> (String, String, u32) {
  let (stem, _) = split_name(backup_filename);
  let (original, tag) = stem.rsplit_once('_').unwrap_or((stem, ""));
  let (timestamp, counter) = match tag.rsplit_once('-') {
    Some((timestamp, n)) => match n.parse() {
      Ok(n) => (timestamp, n),
      Err(_) => (tag, 0),
    },
    None => (tag, 0),
  };
  (original.to_string(), timestamp.to_string(), counter)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn create_test_manager() -> (BackupManager, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let manager = BackupManager::new(temp_dir.path(), temp_dir.path().join("backups"));
    (manager, temp_dir)
  }

  #[test]
  fn test_create_and_list_backup() {
    let (manager, temp_dir) = create_test_manager();
    fs::write(temp_dir.path().join("posts_cache.json"), "[]").unwrap();
    fs::write(temp_dir.path().join("other.json"), "{}").unwrap();

    let backup = manager.create_backup("posts_cache.json").unwrap();
    manager.create_backup("other.json").unwrap();

    assert!(backup.exists());
    let name = backup.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("posts_cache_"));
    assert!(name.ends_with(".json"));

    assert_eq!(manager.list_backups(None).unwrap().len(), 2);
    assert_eq!(manager.list_backups(Some("posts_cache.json")).unwrap(), vec![name.to_string()]);
  }

  #[test]
  fn test_backups_in_quick_succession_do_not_collide() {
    let (manager, temp_dir) = create_test_manager();
    fs::write(temp_dir.path().join("posts_cache.json"), "[]").unwrap();

    let first = manager.create_backup("posts_cache.json").unwrap();
    let second = manager.create_backup("posts_cache.json").unwrap();

    assert_ne!(first, second);
    assert_eq!(manager.list_backups(Some("posts_cache.json")).unwrap().len(), 2);
  }

  #[test]
  fn test_restore_roundtrips_content_and_snapshots_current() {
    let (manager, temp_dir) = create_test_manager();
    let original = temp_dir.path().join("posts_cache.json");
    fs::write(&original, "[\"v1\"]").unwrap();
    let backup = manager.create_backup("posts_cache.json").unwrap();
    fs::write(&original, "[\"v2\"]").unwrap();

    let backup_name = backup.file_name().unwrap().to_str().unwrap();
    let restored = manager.restore_backup(backup_name).unwrap();

    assert_eq!(restored, original);
    assert_eq!(fs::read_to_string(&original).unwrap(), "[\"v1\"]");
    // v2 was snapshotted before being overwritten
    assert_eq!(manager.list_backups(Some("posts_cache.json")).unwrap().len(), 2);
  }

  #[test]
  fn test_delete_with_backup() {
    let (manager, temp_dir) = create_test_manager();
    fs::write(temp_dir.path().join("notes.json"), "[]").unwrap();

    manager.delete_file("notes.json", true).unwrap();

    assert!(!temp_dir.path().join("notes.json").exists());
    assert_eq!(manager.list_backups(Some("notes.json")).unwrap().len(), 1);
  }

  #[test]
  fn test_missing_files_are_not_found() {
    let (manager, _temp_dir) = create_test_manager();

    assert!(matches!(manager.create_backup("nope.json"), Err(BackupError::NotFound(_))));
    assert!(matches!(manager.delete_file("nope.json", false), Err(BackupError::NotFound(_))));
    assert!(matches!(
      manager.restore_backup("nope_20240101T000000000Z.json"),
      Err(BackupError::NotFound(_))
    ));
    assert!(manager.list_backups(None).unwrap().is_empty());
  }

  #[test]
  fn test_path_traversal_is_rejected() {
    let (manager, _temp_dir) = create_test_manager();
    assert!(matches!(manager.create_backup("../etc/passwd"), Err(BackupError::InvalidName(_))));
    assert!(matches!(manager.restore_backup("a/b.json"), Err(BackupError::InvalidName(_))));
  }

  #[test]
  fn test_original_name() {
    assert_eq!(
      original_name("posts_cache_20240101T000000000Z.json").as_deref(),
      Some("posts_cache.json")
    );
    assert_eq!(
      original_name("posts_cache_20240101T000000000Z-2.json").as_deref(),
      Some("posts_cache.json")
    );
    assert_eq!(original_name("nounderscore.json"), None);
  }

  #[test]
  fn test_list_filter_matches_whole_original_name() {
    let (manager, temp_dir) = create_test_manager();
    fs::write(temp_dir.path().join("posts.json"), "[]").unwrap();
    fs::write(temp_dir.path().join("posts_cache.json"), "[]").unwrap();

    manager.create_backup("posts.json").unwrap();
    manager.create_backup("posts_cache.json").unwrap();

    let posts = manager.list_backups(Some("posts.json")).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(original_name(&posts[0]).as_deref(), Some("posts.json"));
    assert_eq!(manager.list_backups(Some("posts_cache.json")).unwrap().len(), 1);
  }

  #[test]
  fn test_retention_keeps_newest_backups() {
    let (manager, temp_dir) = create_test_manager();
    let manager = manager.with_max_backups(3);
    let original = temp_dir.path().join("posts_cache.json");

    let mut created = Vec::new();
    for i in 0..6 {
      fs::write(&original, format!("[{}]", i)).unwrap();
      created.push(manager.create_backup("posts_cache.json").unwrap());
    }

    let names = manager.list_backups(Some("posts_cache.json")).unwrap();
    assert_eq!(names.len(), 3);
    let newest: Vec<String> = created[3..]
      .iter()
      .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
      .collect();
    assert_eq!(names, newest);
  }

  #[test]
  fn test_restore_oldest_backup_at_retention_limit() {
    let (manager, temp_dir) = create_test_manager();
    let manager = manager.with_max_backups(2);
    let original = temp_dir.path().join("posts_cache.json");

    fs::write(&original, "[\"v1\"]").unwrap();
    let oldest = manager.create_backup("posts_cache.json").unwrap();
    fs::write(&original, "[\"v2\"]").unwrap();
    manager.create_backup("posts_cache.json").unwrap();
    fs::write(&original, "[\"v3\"]").unwrap();

    let oldest_name = oldest.file_name().unwrap().to_str().unwrap();
    manager.restore_backup(oldest_name).unwrap();

    assert_eq!(fs::read_to_string(&original).unwrap(), "[\"v1\"]");
    assert_eq!(manager.list_backups(Some("posts_cache.json")).unwrap().len(), 2);
  }

  #[test]
  fn test_retention_is_per_original_file() {
    let (manager, temp_dir) = create_test_manager();
    let manager = manager.with_max_backups(1);
    fs::write(temp_dir.path().join("a.json"), "[]").unwrap();
    fs::write(temp_dir.path().join("b.json"), "[]").unwrap();

    manager.create_backup("a.json").unwrap();
    manager.create_backup("a.json").unwrap();
    manager.create_backup("b.json").unwrap();

    assert_eq!(manager.list_backups(Some("a.json")).unwrap().len(), 1);
    assert_eq!(manager.list_backups(None).unwrap().len(), 2);
  }

  #[test]
  fn test_collision_suffix_sorts_after_plain_timestamp() {
    let mut names = vec![
      "posts_20240101T000000000Z-2.json".to_string(),
      "posts_20240101T000000000Z.json".to_string(),
      "posts_20240101T000000000Z-1.json".to_string(),
    ];
    names.sort_by_cached_key(|name| backup_order(name));
    assert_eq!(
      names,
      vec![
        "posts_20240101T000000000Z.json",
        "posts_20240101T000000000Z-1.json",
        "posts_20240101T000000000Z-2.json",
      ]
    );
  }
}
