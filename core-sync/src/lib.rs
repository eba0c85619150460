//! # Document Sync Module
//!
//! Keeps the user's documents (`vocabulary.json`, `tags.json`,
//! `activity_log.json`) in step with a folder in the remote store.
//!
//! ## Components
//!
//! - **Records** (`records`): document record types and their merge keys
//! - **Merge** (`merge`): last-writer-wins merge, ties keep the local record
//! - **Metadata** (`metadata`): per-file checksum bookkeeping in `sync_metadata.json`
//! - **Engine** (`engine`): download, upload and reconciliation jobs
//! - **Session** (`session`): [`core_auth::SessionSync`] for the login flow

pub mod engine;
pub mod error;
pub mod merge;
pub mod metadata;
pub mod records;
pub mod session;

pub use engine::{FileError, SyncEngine, SyncResult};
pub use error::{Result, SyncError};
pub use merge::{merge_collection, merge_document, MergeStats};
pub use metadata::{checksum, FileSyncMetadata, LocalMetadataStore, METADATA_FILE};
pub use records::{
    ActivityEntry, SyncedRecord, Tag, VocabularyEntry, ACTIVITY_LOG_FILE, SYNCED_FILES,
    TAGS_FILE, VOCABULARY_FILE,
};
