//! # File Storage
//!
//! Byte blobs addressed by a relative, `/`-separated path.
//!
//! ## Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         FileStorage trait                               │
//! │                                                                         │
//! │  save_file / save_file_by_path / delete_file / load_file               │
//! │  file_exists / list_files                                               │
//! │         │                                   │                           │
//! │         ▼                                   ▼                           │
//! │  LocalFileStorage                    MemoryFileStorage                  │
//! │  (rooted directory, tokio::fs)       (BTreeMap, tests and dry runs)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Paths never escape the storage root: absolute paths and `..` segments
//! are rejected.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{DbError, DbResult};

// =============================================================================
// Trait
// =============================================================================

/// Storage for media files.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Writes `data` to `path`, creating parent directories.
    async fn save_file(&self, path: &str, data: &[u8]) -> DbResult<()>;

    /// Copies the local file `source` into storage at `path`.
    async fn save_file_by_path(&self, path: &str, source: &Path) -> DbResult<()>;

    /// Removes a stored file. Fails with NotFound if it does not exist.
    async fn delete_file(&self, path: &str) -> DbResult<()>;

    /// Reads a stored file. Fails with NotFound if it does not exist.
    async fn load_file(&self, path: &str) -> DbResult<Vec<u8>>;

    async fn file_exists(&self, path: &str) -> DbResult<bool>;

    /// Names of the files directly inside `dir`, sorted.
    ///
    /// A missing directory lists as empty.
    async fn list_files(&self, dir: &str) -> DbResult<Vec<String>>;
}

fn check_relative(path: &str) -> DbResult<()> {
    let parsed = Path::new(path);
    let escapes = parsed.is_absolute()
        || parsed
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if path.is_empty() || escapes {
        return Err(DbError::storage(path, "path must be relative to the storage root"));
    }
    Ok(())
}

// =============================================================================
// Local Filesystem
// =============================================================================

/// Files under a root directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileStorage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> DbResult<PathBuf> {
        check_relative(path)?;
        Ok(self.root.join(path))
    }

    async fn ensure_parent(&self, full: &Path, path: &str) -> DbResult<()> {
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DbError::storage(path, e))?;
        }
        Ok(())
    }
}

fn map_io(path: &str, err: std::io::Error) -> DbError {
    if err.kind() == ErrorKind::NotFound {
        DbError::not_found("File", path)
    } else {
        DbError::storage(path, err)
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save_file(&self, path: &str, data: &[u8]) -> DbResult<()> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full, path).await?;
        tokio::fs::write(&full, data)
            .await
            .map_err(|e| DbError::storage(path, e))?;
        debug!(path = %path, bytes = data.len(), "Saved file");
        Ok(())
    }

    async fn save_file_by_path(&self, path: &str, source: &Path) -> DbResult<()> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full, path).await?;
        tokio::fs::copy(source, &full)
            .await
            .map_err(|e| map_io(&source.display().to_string(), e))?;
        debug!(path = %path, source = %source.display(), "Copied file into storage");
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> DbResult<()> {
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn load_file(&self, path: &str) -> DbResult<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await.map_err(|e| map_io(path, e))
    }

    async fn file_exists(&self, path: &str) -> DbResult<bool> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| DbError::storage(path, e))
    }

    async fn list_files(&self, dir: &str) -> DbResult<Vec<String>> {
        let full = self.resolve(dir)?;
        let mut entries = match tokio::fs::read_dir(&full).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DbError::storage(dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DbError::storage(dir, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

// =============================================================================
// In-Memory
// =============================================================================

/// Storage kept in a map; nothing touches the disk except reading sources.
#[derive(Debug, Default)]
pub struct MemoryFileStorage {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl FileStorage for MemoryFileStorage {
    async fn save_file(&self, path: &str, data: &[u8]) -> DbResult<()> {
        check_relative(path)?;
        self.files
            .write()
            .await
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn save_file_by_path(&self, path: &str, source: &Path) -> DbResult<()> {
        let data = tokio::fs::read(source)
            .await
            .map_err(|e| map_io(&source.display().to_string(), e))?;
        self.save_file(path, &data).await
    }

    async fn delete_file(&self, path: &str) -> DbResult<()> {
        self.files
            .write()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| DbError::not_found("File", path))
    }

    async fn load_file(&self, path: &str) -> DbResult<Vec<u8>> {
        self.files
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| DbError::not_found("File", path))
    }

    async fn file_exists(&self, path: &str) -> DbResult<bool> {
        Ok(self.files.read().await.contains_key(path))
    }

    async fn list_files(&self, dir: &str) -> DbResult<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files
            .read()
            .await
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
