//! Synchronized documents and their records.
//!
//! Each document is a JSON array. Fields this crate does not know about are
//! carried through `extra` so a newer client's data survives a merge on an
//! older one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const VOCABULARY_FILE: &str = "vocabulary.json";
pub const TAGS_FILE: &str = "tags.json";
pub const ACTIVITY_LOG_FILE: &str = "activity_log.json";

/// The documents kept in sync, in transfer order.
pub const SYNCED_FILES: [&str; 3] = [VOCABULARY_FILE, TAGS_FILE, ACTIVITY_LOG_FILE];

/// A record with a stable key and a timestamp used to pick a winner.
pub trait SyncedRecord {
    fn key(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyEntry {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<String>,
    pub added_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncedRecord for VocabularyEntry {
    fn key(&self) -> &str {
        &self.word
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.added_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncedRecord for Tag {
    fn key(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// One entry of the study activity log. Entries are append-only, so the id
/// alone decides identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncedRecord for ActivityEntry {
    fn key(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
