//! Local Sync Metadata
//!
//! Tracks, per synchronized file, what the local copy looked like the last
//! time it matched the remote store. Stored as `sync_metadata.json` in the
//! data directory, an object keyed by file name.
//!
//! Change detection compares the SHA-256 of the current local bytes against
//! the recorded checksum. A file with no record counts as changed.

use crate::error::{Result, SyncError};
use bridge_traits::{Clock, FileSystemAccess};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const METADATA_FILE: &str = "sync_metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSyncMetadata {
    pub file_name: String,
    pub last_modified: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the file content
    pub checksum: String,
    pub file_size: u64,
    #[serde(default)]
    pub remote_file_id: Option<String>,
    pub last_synced: DateTime<Utc>,
}

/// Hex-encoded SHA-256 of `data`.
pub fn checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[derive(Clone)]
pub struct LocalMetadataStore {
    fs: Arc<dyn FileSystemAccess>,
    data_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl LocalMetadataStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, data_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fs,
            data_dir: data_dir.into(),
            clock,
        }
    }

    fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(METADATA_FILE)
    }

    fn file_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    /// Record the current state of `file_name` as synchronized.
    ///
    /// When `remote_file_id` is `None` the previously recorded id is kept.
    pub async fn update(&self, file_name: &str, remote_file_id: Option<&str>) -> Result<FileSyncMetadata> {
        let path = self.file_path(file_name);
        let content = self.fs.read_file(&path).await.map_err(SyncError::local)?;
        let stat = self.fs.metadata(&path).await.map_err(SyncError::local)?;

        let mut entries = self.all().await?;
        let remote_file_id = remote_file_id
            .map(str::to_string)
            .or_else(|| entries.get(file_name).and_then(|m| m.remote_file_id.clone()));
        let now = self.clock.now();
        let last_modified = stat
            .modified_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(now);

        let record = FileSyncMetadata {
            file_name: file_name.to_string(),
            last_modified,
            checksum: checksum(&content),
            file_size: content.len() as u64,
            remote_file_id,
            last_synced: now,
        };
        entries.insert(file_name.to_string(), record.clone());
        self.persist(&entries).await?;

        debug!(file = file_name, size = record.file_size, "Sync metadata updated");
        Ok(record)
    }

    pub async fn get(&self, file_name: &str) -> Result<Option<FileSyncMetadata>> {
        Ok(self.all().await?.remove(file_name))
    }

    pub async fn remote_file_id(&self, file_name: &str) -> Result<Option<String>> {
        Ok(self.get(file_name).await?.and_then(|m| m.remote_file_id))
    }

    /// Whether the local file differs from what was last synchronized.
    ///
    /// A missing local file has nothing to push and reports `false`.
    pub async fn has_changed(&self, file_name: &str) -> Result<bool> {
        let path = self.file_path(file_name);
        if !self.fs.exists(&path).await.map_err(SyncError::local)? {
            return Ok(false);
        }
        let Some(record) = self.get(file_name).await? else {
            return Ok(true);
        };
        let content = self.fs.read_file(&path).await.map_err(SyncError::local)?;
        Ok(checksum(&content) != record.checksum)
    }

    /// All records, keyed by file name. Unreadable metadata reads as empty.
    pub async fn all(&self) -> Result<BTreeMap<String, FileSyncMetadata>> {
        let path = self.metadata_path();
        if !self.fs.exists(&path).await.map_err(SyncError::local)? {
            return Ok(BTreeMap::new());
        }
        let raw = self.fs.read_file(&path).await.map_err(SyncError::local)?;
        match serde_json::from_slice(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(
                    file = %path.display(),
                    error = %e,
                    "Ignoring unreadable sync metadata"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    /// Forget every record, so every local file counts as changed.
    pub async fn reset(&self) -> Result<()> {
        let path = self.metadata_path();
        if self.fs.exists(&path).await.map_err(SyncError::local)? {
            self.fs.delete_file(&path).await.map_err(SyncError::local)?;
        }
        debug!("Sync metadata reset");
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn persist(&self, entries: &BTreeMap<String, FileSyncMetadata>) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries).map_err(|e| SyncError::Serialization {
            file: METADATA_FILE.to_string(),
            message: e.to_string(),
        })?;
        self.fs.create_dir_all(&self.data_dir).await.map_err(SyncError::local)?;
        self.fs
            .write_atomic(&self.metadata_path(), Bytes::from(json))
            .await
            .map_err(SyncError::local)?;
        Ok(())
    }
}
