//! Remote File Store Abstraction
//!
//! The minimal object-storage surface the sync engine needs. A backend
//! (Google Drive, an in-memory fake, ...) implements [`RemoteFileStore`];
//! a [`RemoteStoreFactory`] binds one to a freshly obtained access token.
//!
//! "Not found" is expressed as `Ok(None)`, never as an error.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::Result;

/// Metadata supplied when creating a remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRemoteFile {
    pub name: String,
    pub parent_id: String,
    pub mime_type: String,
}

impl NewRemoteFile {
    pub fn json(name: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_id: parent_id.into(),
            mime_type: "application/json".to_string(),
        }
    }
}

#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// Find a non-trashed file by exact name inside `folder_id`.
    async fn list_by_name_in_folder(&self, name: &str, folder_id: &str) -> Result<Option<String>>;

    /// Create a file and return its remote id.
    async fn create(&self, metadata: NewRemoteFile, content: Bytes) -> Result<String>;

    /// Replace the content of an existing file in place.
    async fn update_content(&self, file_id: &str, content: Bytes) -> Result<()>;

    /// Download the full content of a file.
    async fn get(&self, file_id: &str) -> Result<Bytes>;

    /// Return the id of the top-level folder `name`, creating it if missing.
    async fn get_or_create_folder(&self, name: &str) -> Result<String>;
}

/// Builds a [`RemoteFileStore`] authorized with a bearer token.
pub trait RemoteStoreFactory: Send + Sync {
    fn connect(&self, access_token: &str) -> Arc<dyn RemoteFileStore>;
}
