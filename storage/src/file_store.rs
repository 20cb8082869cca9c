//! Offset persisted as a single line in a text file.
//!
//! Commits write to a temp file next to the target, fsync it and rename it over the target,
//! so a reader (or a restart after a crash) sees either the old or the new offset.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rbot_core::Offset;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::offset_store::OffsetStore;

/// File name used when no explicit location is configured: `offset_<first 10 chars of token>.txt`.
pub fn default_offset_path(token: &str) -> PathBuf {
    let prefix: String = token.chars().take(10).collect();
    PathBuf::from(format!("offset_{prefix}.txt"))
}

#[derive(Debug, Clone)]
pub struct FileOffsetStore {
    path: PathBuf,
}

impl FileOffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_offset(path: &Path) -> Result<Option<Offset>, StorageError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let value = content.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.contains(char::is_whitespace) {
        return Err(StorageError::Corrupt(format!(
            "{}: unexpected content {value:?}",
            path.display()
        )));
    }
    Ok(Some(Offset::from(value)))
}

fn write_offset(path: &Path, offset: &Offset) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    writeln!(tmp, "{offset}")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error.to_string()))?;

    // The rename itself is durable only once the directory entry is flushed.
    #[cfg(unix)]
    std::fs::File::open(&dir)?.sync_all()?;
    Ok(())
}

#[async_trait]
impl OffsetStore for FileOffsetStore {
    async fn load(&self) -> Result<Option<Offset>, StorageError> {
        let path = self.path.clone();
        let offset = tokio::task::spawn_blocking(move || read_offset(&path)).await??;
        debug!(path = %self.path.display(), offset = ?offset, "Loaded offset");
        Ok(offset)
    }

    async fn commit(&self, offset: &Offset) -> Result<(), StorageError> {
        let path = self.path.clone();
        let value = offset.clone();
        tokio::task::spawn_blocking(move || write_offset(&path, &value)).await??;
        debug!(path = %self.path.display(), offset = %offset, "Committed offset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_offset_path_uses_token_prefix() {
        assert_eq!(
            default_offset_path("ABCDEFGHIJKLMNOP"),
            PathBuf::from("offset_ABCDEFGHIJ.txt")
        );
        assert_eq!(default_offset_path("short"), PathBuf::from("offset_short.txt"));
    }

    #[test]
    fn test_read_offset_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offset.txt");
        std::fs::write(&path, "12 34\n").unwrap();
        assert!(matches!(read_offset(&path), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_read_offset_empty_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offset.txt");
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(read_offset(&path).unwrap(), None);
    }
}
