//! File-backed Credential Storage
//!
//! Persists the OAuth credential (`token.json`) and the scopes it was last
//! proven to work with (`scopes.json`) in a directory reserved for them.
//!
//! ## Guarantees
//!
//! - Every write goes through [`FileSystemAccess::write_atomic`], so a crash
//!   leaves either the old or the new file, never a torn one
//! - A corrupted file reads as absent and is removed
//! - [`CredentialStore::clear_all`] wipes the directory, including files this
//!   crate did not write
//! - Token values are never logged
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{Credential, CredentialStore};
//! use std::sync::Arc;
//! # use bridge_traits::FileSystemAccess;
//! # async fn example(fs: Arc<dyn FileSystemAccess>) -> core_auth::Result<()> {
//! let store = CredentialStore::new(fs, "/home/ada/.local/share/lexicon/credentials");
//!
//! let credential = Credential::new("ya29.a0...", None, chrono::Utc::now(), 3600);
//! store.save(&credential).await?;
//! assert!(store.load().await?.is_some());
//!
//! store.clear_all().await?;
//! assert!(store.load().await?.is_none());
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{Credential, ScopeMetadata};
use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TOKEN_FILE: &str = "token.json";
const SCOPES_FILE: &str = "scopes.json";

#[derive(Clone)]
pub struct CredentialStore {
    fs: Arc<dyn FileSystemAccess>,
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "Initializing CredentialStore");
        Self { fs, dir }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    fn scopes_path(&self) -> PathBuf {
        self.dir.join(SCOPES_FILE)
    }

    /// Load the stored credential.
    ///
    /// Returns `Ok(None)` when nothing is stored or the file does not parse.
    pub async fn load(&self) -> Result<Option<Credential>> {
        self.read_json(&self.token_path(), "credential").await
    }

    /// Replace the stored credential atomically.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        self.write_json(&self.token_path(), credential).await?;
        info!(
            expires_at = %credential.expires_at(),
            has_refresh_token = credential.can_refresh(),
            "Credential saved"
        );
        Ok(())
    }

    pub async fn load_scopes(&self) -> Result<Option<ScopeMetadata>> {
        self.read_json(&self.scopes_path(), "scope metadata").await
    }

    pub async fn save_scopes(&self, metadata: &ScopeMetadata) -> Result<()> {
        self.write_json(&self.scopes_path(), metadata).await?;
        debug!(scopes = metadata.scopes.len(), "Scope metadata saved");
        Ok(())
    }

    /// Remove every file in the credential directory.
    ///
    /// Idempotent. The directory itself is recreated empty.
    pub async fn clear_all(&self) -> Result<()> {
        if self.fs.exists(&self.dir).await? {
            self.fs.delete_dir_all(&self.dir).await?;
        }
        self.fs.create_dir_all(&self.dir).await?;
        info!(dir = %self.dir.display(), "Credential directory cleared");
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path, what: &str) -> Result<Option<T>> {
        if !self.fs.exists(path).await? {
            return Ok(None);
        }

        let raw = self.fs.read_file(path).await?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // Error text may quote file contents; keep only the position
                warn!(
                    file = %path.display(),
                    line = e.line(),
                    column = e.column(),
                    "Discarding unreadable {}",
                    what
                );
                if let Err(delete_err) = self.fs.delete_file(path).await {
                    warn!(error = %delete_err, "Failed to delete unreadable {}", what);
                }
                Ok(None)
            }
        }
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.fs.create_dir_all(&self.dir).await?;
        self.fs
            .write_atomic(path, Bytes::from(json))
            .await
            .map_err(|e| AuthError::LocalIoFailure(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> CredentialStore {
        let fs = Arc::new(TokioFileSystem::new());
        CredentialStore::new(fs, tmp.path().join("credentials"))
    }

    fn credential() -> Credential {
        Credential::new(
            "access",
            Some("refresh".to_string()),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            3600,
        )
        .with_scope("https://www.googleapis.com/auth/drive.file")
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        assert!(store.load().await.unwrap().is_none());
        assert!(store.load_scopes().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_credential() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.save(&credential()).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(credential()));
        assert!(tmp.path().join("credentials/token.json").exists());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_credential() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.save(&credential()).await.unwrap();
        let mut rotated = credential();
        rotated.access_token = "rotated".to_string();
        store.save(&rotated).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "rotated");
    }

    #[tokio::test]
    async fn test_corrupted_token_reads_as_absent_and_is_removed() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let dir = tmp.path().join("credentials");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("token.json"), b"{ not json").unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(!dir.join("token.json").exists());
    }

    #[tokio::test]
    async fn test_scope_metadata_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let metadata = ScopeMetadata::new(
            ["https://www.googleapis.com/auth/drive.file"],
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        );

        store.save_scopes(&metadata).await.unwrap();

        assert_eq!(store.load_scopes().await.unwrap(), Some(metadata));
    }

    #[tokio::test]
    async fn test_clear_all_removes_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.save(&credential()).await.unwrap();
        std::fs::write(tmp.path().join("credentials/Google.Apis.Auth.token"), b"x").unwrap();

        store.clear_all().await.unwrap();

        let remaining: Vec<_> = std::fs::read_dir(tmp.path().join("credentials"))
            .unwrap()
            .collect();
        assert!(remaining.is_empty());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_all_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.clear_all().await.unwrap();
        store.clear_all().await.unwrap();

        assert!(tmp.path().join("credentials").is_dir());
    }
}
