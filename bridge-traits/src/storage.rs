//! File System Abstraction
//!
//! Platform-agnostic file I/O used by the credential store, the sync metadata
//! store and the synchronized documents themselves.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    /// Last modification as Unix seconds.
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn save_document(fs: &dyn FileSystemAccess, dir: &Path, data: &[u8]) -> Result<()> {
///     fs.create_dir_all(dir).await?;
///     fs.write_atomic(&dir.join("vocabulary.json"), data.to_vec().into()).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Rename a file, replacing the destination if present
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Delete a directory and all its contents
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// Replace `path` with `data` so readers never observe a partial write.
    ///
    /// Writes a sibling temp file, then renames it over the destination.
    async fn write_atomic(&self, path: &Path, data: Bytes) -> Result<()> {
        let tmp = temp_sibling(path);
        self.write_file(&tmp, data).await?;
        if let Err(e) = self.rename(&tmp, path).await {
            let _ = self.delete_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }
}

/// `<dir>/.<name>.tmp` next to `path`.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
